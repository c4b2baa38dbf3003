use clap::Parser;
use tenderscope_core::{
    blocks::BlocksArgs,
    validate::ValidateArgs,
};

#[derive(Parser)]
#[command(
    name = "tenderscope",
    version,
    about = "Cross-validate cosmoswatch exporter metrics against CometBFT RPC data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    #[command(name = "validate")]
    Validate(ValidateArgs),
    #[command(name = "blocks")]
    Blocks(BlocksArgs),
}
