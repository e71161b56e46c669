//! Print graph metrics for the configured database.

use clap::Parser;
use relgraph::{db::Db, Config, GraphAggregator, Store};

/// Graph statistics: size, density, degrees and group connectivity.
#[derive(Parser, Debug)]
#[command(name = "stats")]
struct Args {
    /// Print the metrics as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// How many nodes to list in the degree ranking
    #[arg(long, default_value_t = 10)]
    top: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    if !config.db_path().exists() {
        anyhow::bail!(
            "Database {} does not exist; run `relgraph verify` or `relgraph seed` first",
            config.db_path().display()
        );
    }

    let store = Store::new(Db::new(config.db_path()));
    let persons = store.list_persons().await?;
    let relationships = store.list_relationships_with_names().await?;
    let snapshot = GraphAggregator::new(config.graph.clone()).build(&persons, &relationships);
    let metrics = &snapshot.metrics;

    if args.json {
        println!("{}", serde_json::to_string_pretty(metrics)?);
        return Ok(());
    }

    println!("\n=== relgraph network statistics ===\n");
    println!("Persons:        {}", metrics.node_count);
    println!("Relationships:  {}", metrics.edge_count);
    println!("Density:        {:.3}", metrics.density);
    match &metrics.most_connected {
        Some(top) => println!("Most connected: {} ({} connections)", top.label, top.degree),
        None => println!("Most connected: -"),
    }

    if snapshot.nodes.is_empty() {
        println!("\nNo persons stored yet.");
        return Ok(());
    }

    let mut ranking: Vec<_> = snapshot
        .nodes
        .iter()
        .map(|n| {
            let degree = metrics.degree.get(&n.id).copied().unwrap_or(0);
            let strong = metrics.strong_degree.get(&n.id).copied().unwrap_or(0);
            (n, degree, strong)
        })
        .collect();
    ranking.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.label.cmp(&b.0.label)));

    println!("\nDegree ranking:\n");
    println!("{:-<72}", "");
    println!("{:<32} {:>10} {:>10} {:>14}", "Person", "Degree", "Strong", "Centrality");
    println!("{:-<72}", "");
    for (node, degree, strong) in ranking.iter().take(args.top) {
        println!(
            "{:<32} {:>10} {:>10} {:>13.1}%",
            node.label,
            degree,
            strong,
            metrics.centrality(node.id) * 100.0
        );
    }
    println!("{:-<72}", "");

    println!("\nGroups:\n");
    println!("{:-<72}", "");
    println!("{:<28} {:>8} {:>10} {:>10} {:>10}", "Group", "Nodes", "Internal", "External", "Density");
    println!("{:-<72}", "");
    for (group, stats) in &metrics.groups {
        println!(
            "{:<28} {:>8} {:>10} {:>10} {:>10.3}",
            group, stats.nodes, stats.internal_edges, stats.external_edges, stats.density
        );
    }
    println!("{:-<72}", "");

    Ok(())
}
