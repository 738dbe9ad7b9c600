//! Reinhardt Interactivity CLI
//!
//! Renders directive markup on the server side and inspects the bindings a
//! page declares, without running a web server.
//!
//! ## Usage
//!
//! ```bash
//! reinhardt-interactivity render page.html --state state.json --pretty
//! reinhardt-interactivity inspect page.html
//! ```

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reinhardt-interactivity")]
#[command(about = "Render and inspect directive-driven markup", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Verbosity level (can be repeated)
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbosity: u8,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the server pass over a markup file and print the resulting HTML
	Render {
		/// Markup file to render
		#[arg(value_name = "MARKUP")]
		markup: PathBuf,

		/// JSON file shaped like the hydration payload: {"state": {...}, "config": {...}}
		#[arg(short, long, value_name = "PATH")]
		state: Option<PathBuf>,

		/// TOML file with renderer options
		#[arg(short, long, value_name = "PATH")]
		config: Option<PathBuf>,

		/// Pretty-print the embedded state payload
		#[arg(long)]
		pretty: bool,

		/// Write the result to a file instead of stdout
		#[arg(short, long, value_name = "PATH")]
		output: Option<PathBuf>,
	},

	/// List interactive roots, bindings and disabled directives of a markup file
	Inspect {
		/// Markup file to inspect
		#[arg(value_name = "MARKUP")]
		markup: PathBuf,

		/// TOML file with renderer options
		#[arg(short, long, value_name = "PATH")]
		config: Option<PathBuf>,
	},
}

fn init_tracing(verbosity: u8) {
	let default_level = match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn main() {
	let cli = Cli::parse();
	init_tracing(cli.verbosity);

	let result = match cli.command {
		Commands::Render {
			markup,
			state,
			config,
			pretty,
			output,
		} => run_render(markup, state, config, pretty, output),
		Commands::Inspect { markup, config } => run_inspect(markup, config),
	};

	if let Err(e) = result {
		eprintln!("{}: {:#}", "Error".red().bold(), e);
		process::exit(1);
	}
}

fn run_render(
	markup: PathBuf,
	state: Option<PathBuf>,
	config: Option<PathBuf>,
	pretty: bool,
	output: Option<PathBuf>,
) -> anyhow::Result<()> {
	let options = commands::RenderOptions {
		markup,
		state,
		config,
		pretty,
	};
	let rendered = commands::render(&options)?;

	for disabled in &rendered.disabled {
		eprintln!(
			"{} {} on node {}: {}",
			"disabled".yellow(),
			disabled.attribute,
			disabled.element.index(),
			disabled.reason
		);
	}

	match output {
		Some(path) => {
			std::fs::write(&path, &rendered.html)?;
			println!(
				"{} {} ({} interactive root(s))",
				"Rendered".green(),
				path.display(),
				rendered.roots
			);
		}
		None => println!("{}", rendered.html),
	}
	Ok(())
}

fn run_inspect(markup: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
	let report = commands::inspect(&markup, config.as_deref())?;

	if report.roots.is_empty() {
		println!("{}", "No interactive roots found".yellow());
		return Ok(());
	}
	for root in &report.roots {
		println!(
			"{} {} (node {})",
			"root".green().bold(),
			root.namespace,
			root.element.index()
		);
	}
	for line in &report.bindings {
		println!("  {}", line);
	}
	for disabled in &report.disabled {
		println!(
			"  {} {} on node {}: {}",
			"disabled".red(),
			disabled.attribute,
			disabled.element.index(),
			disabled.reason
		);
	}
	Ok(())
}
