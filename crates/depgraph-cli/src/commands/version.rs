use depgraph_core::version::{version_string, SCHEMA_VERSION, VERSION};
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "version": VERSION, "schema_version": SCHEMA_VERSION })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
