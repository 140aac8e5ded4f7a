use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "chart2rgd", version, about = "Convert Helm charts to ResourceGraphDefinitions")]
pub struct Cli {
    /// Emit JSON output on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a chart directory into a ResourceGraphDefinition.
    Convert(ConvertArgs),

    /// Validate an existing ResourceGraphDefinition file.
    Validate {
        /// Path to the document, `-` for stdin.
        file: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Chart directory (Chart.yaml, values.yaml, templates/).
    pub chart: String,

    /// Release name used for both renders.
    #[arg(long, default_value = "release")]
    pub release_name: String,

    #[arg(long)]
    pub namespace: Option<String>,

    /// Inference strategy: sentinel|ast
    #[arg(long, default_value = "sentinel")]
    pub strategy: String,

    /// Emit every values leaf into the schema, not just referenced ones.
    #[arg(long)]
    pub include_all_params: bool,

    /// Flatten schema field names into camel case.
    #[arg(long)]
    pub flat_names: bool,

    /// Keep helm lifecycle hooks as resources.
    #[arg(long)]
    pub include_hooks: bool,

    /// Additional values files, later files win.
    #[arg(short = 'f', long = "values")]
    pub values: Vec<String>,

    /// Scalar value overrides, `path=value`.
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Resource id override, `Kind/name=id`.
    #[arg(long = "id-override")]
    pub id_overrides: Vec<String>,

    /// Schema override, `path=type[:default]`.
    #[arg(long = "schema-override")]
    pub schema_overrides: Vec<String>,

    /// Output file (stdout when omitted).
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Write one file per resource plus a catalog into this directory.
    #[arg(long)]
    pub split: Option<String>,

    /// Output format: yaml|json
    #[arg(long, default_value = "yaml")]
    pub format: String,

    /// Annotate ${…} expressions with explanatory comments.
    #[arg(long)]
    pub annotate: bool,

    /// Render deadline in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Helm binary used for rendering.
    #[arg(long, default_value = "helm")]
    pub helm_bin: String,

    /// Stamp a generated-at annotation with the current time.
    #[arg(long)]
    pub timestamp: bool,
}
