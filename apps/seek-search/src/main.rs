use clap::Parser;

use seek_search::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	seek_search::run(args).await
}
