use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
};
use clap::Parser;
use tabula::{Config, CsvOptions, Result, TableReader, TableView};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tabula-dump")]
#[command(about = "Describe a tabula table file, optionally exporting it as CSV", long_about = None)]
struct Args {
    /// Table file to inspect
    path: PathBuf,

    /// TOML file with cache and block sizes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also list the datasets inside the container
    #[arg(short, long)]
    datasets: bool,

    /// Print the rows as a formatted table
    #[arg(short, long)]
    show: bool,

    /// Export rows as CSV to this file ("-" for stdout)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Export cells through their column formats, skipping hidden columns
    #[arg(long, requires = "csv")]
    as_printed: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tabula=warn".into()))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(p) => Config::from_toml_str(&std::fs::read_to_string(p)?)?,
        None => Config::default(),
    };
    let mut reader = TableReader::open_with(&args.path, &cfg)?;
    let meta = reader.file_meta();

    let mut out = io::stdout().lock();
    writeln!(out, "file:    {}", args.path.display())?;
    writeln!(out, "version: {}.{}", meta.version.0, meta.version.1)?;
    writeln!(out, "title:   {}", meta.title.as_deref().unwrap_or("-"))?;
    writeln!(out, "rows:    {}", reader.len())?;
    writeln!(out, "columns:")?;
    let schema = reader.schema();
    for i in 0..schema.len() {
        let format = schema.format_at(i).map_or("hidden".to_string(), |f| f.to_string());
        writeln!(out, "  {:<20} {:<12} {}", schema.name(i), schema.type_at(i), format)?;
    }
    let table_meta = meta.table_meta()?;
    if !table_meta.is_empty() {
        writeln!(out, "meta:")?;
        for (k, v) in &table_meta {
            writeln!(out, "  {k} = {v}")?;
        }
    }
    if args.datasets {
        writeln!(out, "datasets:")?;
        for (name, len) in reader.datasets() {
            writeln!(out, "  {name:<40} {len} bytes")?;
        }
    }

    if !args.show && args.csv.is_none() {
        return Ok(());
    }
    let table = reader.read_table()?;
    if args.show {
        writeln!(out, "{table}")?;
    }
    if let Some(target) = &args.csv {
        let opts = CsvOptions {
            as_printed: args.as_printed,
            ..CsvOptions::default()
        };
        if target.as_os_str() == "-" {
            table.to_csv(&mut out, &opts)?;
        } else {
            table.to_csv(File::create(target)?, &opts)?;
            eprintln!("wrote {} rows to {}", table.len(), target.display());
        }
    }
    Ok(())
}
