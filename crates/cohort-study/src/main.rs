//! Study definition binary.
//!
//! Loads the codelist directory, builds the study definition and writes it
//! as JSON to `COHORT_OUTPUT` or stdout.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use cohort_loader::CodelistCatalog;
use cohort_study::codelists::study_codelists;
use cohort_study::{build_study, StudyConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = StudyConfig::from_env()?;
    tracing::info!("Loading codelists from: {}", config.codelist_dir.display());

    let sources = study_codelists();
    let mut catalog = CodelistCatalog::new(&config.codelist_dir);

    #[cfg(feature = "parallel")]
    let stats = catalog.load_all_parallel(&sources)?;
    #[cfg(not(feature = "parallel"))]
    let stats = catalog.load_all(&sources)?;

    tracing::info!(
        "Loaded {} codelists ({} codes, {} rows read)",
        catalog.len(),
        catalog.total_codes(),
        stats.rows_read
    );

    let study = build_study(&config, &catalog)?;

    match &config.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            study.write_json(&mut writer)?;
            writer.flush()?;
            tracing::info!("Wrote study definition to {}", path.display());
        }
        None => study.write_json(io::stdout().lock())?,
    }

    Ok(())
}
