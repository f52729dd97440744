//! Schema command - print the expected model format

use clap::Args;
use fincast::core::Model;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let schema = schema_for!(Model);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }
}
