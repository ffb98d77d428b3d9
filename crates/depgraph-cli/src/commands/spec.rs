use super::load_solution;
use depgraph_core::restore::GraphSpec;
use depgraph_core::Config;
use miette::{IntoDiagnostic, Result};
use std::io::{self, Write};
use std::path::Path;

/// Print the graph spec built from the solution.
///
/// `--json` prints the full spec document; otherwise one block per project.
pub fn run(config: &Config, solution: Option<&Path>, json: bool) -> Result<()> {
    let solution = load_solution(&config.cwd, solution)?;
    let graph = solution.build_spec().into_diagnostic()?;

    if json {
        let out = serde_json::to_string_pretty(&graph).into_diagnostic()?;
        println!("{out}");
        return Ok(());
    }
    print_human(&graph)
}

fn print_human(graph: &GraphSpec) -> Result<()> {
    let mut out = io::stdout().lock();
    for node in &graph.nodes {
        let frameworks: Vec<&str> = node.frameworks.iter().map(|f| f.moniker()).collect();
        writeln!(out, "{} [{}]", node.id, frameworks.join(", ")).into_diagnostic()?;
        writeln!(out, "  path: {}", node.path.display()).into_diagnostic()?;
        writeln!(out, "  lock: {}", node.restore.lock_file.display()).into_diagnostic()?;
        for reference in &node.references {
            writeln!(out, "  package {} {}", reference.id, reference.range).into_diagnostic()?;
        }
        for project in &node.project_references {
            writeln!(out, "  project {project}").into_diagnostic()?;
        }
    }
    Ok(())
}
