use super::*;

#[derive(Debug, Parser)]
#[command(
    name = "crawld",
    version,
    about = "Crawls code hosts for repositories and keeps local clones up to date"
)]
pub(super) struct Cli {
    #[arg(short = 'c', long, value_name = "FILE", help = "Path to the JSON configuration file")]
    pub(super) config: PathBuf,
    #[arg(long, help = "Do not run the data crawlers")]
    pub(super) disable_crawlers: bool,
    #[arg(long, help = "Do not clone or update repositories")]
    pub(super) disable_fetcher: bool,
}
