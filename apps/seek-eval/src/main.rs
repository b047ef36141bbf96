use clap::Parser;

use seek_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	seek_eval::run(args).await
}
