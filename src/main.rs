use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use clap::Parser;
use section_stream::session::SearchState;
use section_stream::streaming::Section;
use section_stream::{SessionUpdate, StreamClient, StreamConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "section-stream", version, about = "Ask a question and stream the sectioned answer")]
struct Args {
    /// Question to ask
    query: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the streaming endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Render at most one snapshot per batch of received data
    #[arg(long)]
    coalesce: bool,

    /// Print the final snapshot as JSON instead of streaming text
    #[arg(long)]
    json: bool,
}

/// Prints only what is new since the previous snapshot
#[derive(Default)]
struct Printer {
    printed: HashMap<String, usize>,
    current: Option<String>,
    search: SearchState,
    quiet: bool,
}

impl Printer {
    fn sections(&mut self, out: &mut impl Write, sections: &[Section]) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        for section in sections {
            let done = self.printed.get(&section.id).copied().unwrap_or(0);
            if section.content.len() <= done {
                continue;
            }

            if self.current.as_deref() != Some(section.id.as_str()) {
                write!(out, "\n\n## {}\n\n", section.title)?;
                self.current = Some(section.id.clone());
            }
            write!(out, "{}", &section.content[done..])?;
            self.printed.insert(section.id.clone(), section.content.len());
        }
        out.flush()
    }

    fn search(&mut self, search: &SearchState) {
        if self.quiet || *search == self.search {
            return;
        }

        if let Some(progress) = search.progress {
            eprintln!("search progress: {}%", progress.round());
        }
        if search.steps != self.search.steps {
            for step in &search.steps {
                let marker = if step.is_completed {
                    "x"
                } else if step.is_active {
                    ">"
                } else {
                    " "
                };
                eprintln!("[{}] {}", marker, step.text);
            }
        }
        self.search = search.clone();
    }
}

async fn drive(client: &mut StreamClient, printer: &mut Printer, coalesce: bool) -> Result<()> {
    let mut stdout = std::io::stdout();

    if coalesce {
        while let Some(snapshot) = client.next_frame().await {
            printer.sections(&mut stdout, &snapshot.sections)?;
            printer.search(&snapshot.search);
        }
        return Ok(());
    }

    while let Some(update) = client.next_update().await {
        match update {
            SessionUpdate::Sections(sections) => printer.sections(&mut stdout, &sections)?,
            SessionUpdate::Search(search) => printer.search(&search),
            SessionUpdate::Finished => info!("Stream finished"),
            SessionUpdate::Failed(e) => error!("Stream failed: {}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::from_env()?,
    };
    if let Some(endpoint) = args.endpoint {
        config.client.endpoint = endpoint;
    }
    config.validate()?;

    let mut client = StreamClient::from_config(&config)?;
    client.open(&args.query)?;

    let mut printer = Printer {
        quiet: args.json,
        ..Default::default()
    };

    let driven = tokio::select! {
        result = drive(&mut client, &mut printer, args.coalesce) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match driven {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            client.close();
            return Err(e);
        }
        None => {
            client.close();
            eprintln!("\ninterrupted");
        }
    }

    let snapshot = client.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!();
    }

    if let Some(e) = snapshot.error {
        anyhow::bail!(e);
    }
    Ok(())
}
