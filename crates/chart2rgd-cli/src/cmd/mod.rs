use anyhow::Result;

use crate::args::{Cli, Command};

mod convert;
mod validate;

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert(args) => convert::run(&args),
        Command::Validate { file } => validate::run(&file),
    }
}
