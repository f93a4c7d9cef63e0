use super::*;

/// Parses flags, runs the daemon and returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    logging::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return 1;
        }
    };
    let result = runtime.block_on(start(cli));
    // Clones and updates still running on blocking threads are abandoned.
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!("crawld stopped");
            0
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "fatal error");
            1
        }
    }
}

async fn start(cli: Cli) -> anyhow::Result<()> {
    let supervisor = prepare(&cli)?;
    supervisor.run(shutdown_signal()).await
}

pub(super) fn prepare(cli: &Cli) -> anyhow::Result<Supervisor> {
    let config = AppConfig::load(&cli.config)?;
    check_clone_dir(&config.clone_dir)?;

    let catalog_path = config.catalog_path();
    let catalog: Arc<dyn Catalog> = Arc::new(
        JsonCatalog::open(&catalog_path)
            .with_context(|| format!("open catalog {}", catalog_path.display()))?,
    );
    let crawlers = CrawlerRegistry::new().build_all(&config.crawlers, Arc::clone(&catalog))?;

    info!(
        config = %cli.config.display(),
        clone_dir = %config.clone_dir.display(),
        catalog = %catalog_path.display(),
        crawlers = crawlers.len(),
        workers = config.max_fetcher_workers,
        "crawld starting"
    );

    Ok(Supervisor::new(config, catalog, Arc::new(RepoRegistry::new()), crawlers)
        .disable_crawlers(cli.disable_crawlers)
        .disable_fetcher(cli.disable_fetcher))
}
