use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = edw_api::Args::parse();

	edw_api::run(args).await
}
