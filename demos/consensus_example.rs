use groupscan::search::search_configured;
use groupscan::{AlgorithmKind, EngineConfig, RawTable, analyze};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const COLUMNS: [&str; 5] = [
    "qtd_cnpjs",
    "socios_compartilhados",
    "indice_interconexao",
    "receita_maxima",
    "indice_risco_indicios",
];

/// Three group profiles with jitter, a few incomplete rows and two oddballs.
fn synthetic_groups() -> Result<RawTable, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(2024);
    let profiles = [
        [3.0, 1.0, 0.1, 2.0e6, 0.5],
        [12.0, 6.0, 0.6, 8.0e6, 2.0],
        [30.0, 15.0, 0.9, 4.0e7, 6.0],
    ];

    let mut table = RawTable::new(COLUMNS);
    for i in 0..60 {
        let profile = profiles[i % profiles.len()];
        let mut values: Vec<Option<f64>> = profile
            .iter()
            .map(|&center| Some(center * rng.gen_range(0.85..1.15)))
            .collect();
        if i % 17 == 0 {
            values[3] = None;
        }
        table.push_row(format!("GRP-{i:04}"), values)?;
    }
    table.push_row("GRP-9001", vec![Some(250.0), Some(1.0), Some(0.05), Some(9.0e8), Some(40.0)])?;
    table.push_row("GRP-9002", vec![Some(2.0), Some(60.0), Some(1.0), Some(1.0e5), Some(25.0)])?;
    Ok(table)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Economic Group Pattern Detection ===\n");

    let table = synthetic_groups()?;
    let config = EngineConfig::from_json_str(
        r#"{
            "kmeans": {"n_clusters": 3},
            "hierarchical": {"n_clusters": 3},
            "dbscan": {"eps": 0.8, "min_samples": 4},
            "isolation_forest": {"contamination": 0.05},
            "pca_components": 2
        }"#,
    )?;

    let analysis = analyze(&table, &config)?;
    println!(
        "Matrix: {} groups x {} features ({} incomplete rows dropped)",
        analysis.matrix.n_rows(),
        analysis.matrix.n_features(),
        analysis.matrix.dropped_rows
    );
    if let Some(captured) = analysis.pca.explained_variance_fraction() {
        println!("PCA: {:.1}% of variance in 2 components\n", captured * 100.0);
    }

    println!("=== Consensus ===");
    for envelope in analysis.envelopes()? {
        match &envelope.failure_reason {
            Some(reason) => println!("  {:<16} failed: {}", envelope.display_name, reason),
            None => println!("  {:<16} ok, {} groups labeled", envelope.display_name, envelope.labels.len()),
        }
        println!("    {}", serde_json::to_string(&envelope.metrics)?);
    }

    println!("\n=== Flagged groups ===");
    for point in analysis.projection_for(AlgorithmKind::IsolationForest)? {
        if point.label == groupscan::ANOMALY {
            println!("  {} at ({:.2}, {:.2})", point.entity_id, point.coords[0], point.coords[1]);
        }
    }

    let summary = search_configured(&analysis.matrix.standardized, &config)?;

    println!("\n=== K selection ===");
    let k_search = &summary.k;
    for row in k_search.elbow_table() {
        println!("  k={} inertia={:?} silhouette={:?}", row.k, row.inertia, row.silhouette);
    }
    match k_search.best() {
        Some(best) => println!("  best k = {}", best.params),
        None => println!("  no k produced a computable silhouette"),
    }

    println!("\n=== DBSCAN grid ===");
    let grid = &summary.dbscan;
    match grid.best() {
        Some(best) => println!(
            "  best eps={} min_samples={} over {} candidates",
            best.params.eps,
            best.params.min_samples,
            grid.records.len()
        ),
        None => println!("  no valid configuration found"),
    }

    Ok(())
}
