use std::{
    collections::HashMap,
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use lambda_sql::{
    Converter, Extractor, QueryRequest, SelectKind,
    config::{Config, DialectKind},
    model::Catalog,
    parser::parse_lambda,
    translate::IncludeGraph,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Compile C#-style lambda filters into SQL, one per line of stdin.
#[derive(Parser, Debug)]
#[command(name = "lambda-sql", version)]
struct Cli {
    /// JSON model catalog
    #[arg(long)]
    catalog: PathBuf,

    /// The model every lambda is bound to
    #[arg(long)]
    model: String,

    /// JSON converter config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    dialect: Option<DialectKind>,

    /// many, first, single, count or any
    #[arg(long, default_value = "many")]
    select: SelectKind,

    /// An ordering key lambda, optionally followed by " desc". Repeatable.
    #[arg(long = "order-by")]
    order_by: Vec<String>,

    /// Only project these properties
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    #[arg(long)]
    skip: Option<u64>,

    #[arg(long)]
    take: Option<u64>,

    /// Print the values each named property is compared against instead of
    ///  SQL
    #[arg(long, value_delimiter = ',')]
    extract: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let catalog_json = std::fs::read_to_string(&cli.catalog)
        .with_context(|| format!("reading catalog {}", cli.catalog.display()))?;
    let catalog = Catalog::from_json(&catalog_json).context("parsing catalog")?;

    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Config::from_json(&json).context("parsing config")?
        }
        None => Config::default(),
    };
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    debug!(?config, model = %cli.model, "starting");

    let mut base = QueryRequest::new(&cli.model).select(cli.select);
    for key in &cli.order_by {
        let (text, descending) = match key.strip_suffix(" desc") {
            Some(text) => (text, true),
            None => (key.as_str(), false),
        };
        let key = parse_lambda(text, &cli.model, &catalog)
            .with_context(|| format!("parsing order key '{text}'"))?;
        base = if descending {
            base.order_by_descending(key)
        } else {
            base.order_by(key)
        };
    }
    if let Some(skip) = cli.skip {
        base = base.skip(skip);
    }
    if let Some(take) = cli.take {
        base = base.take(take);
    }
    if !cli.columns.is_empty() {
        base = base.include(IncludeGraph::columns(cli.columns.iter().cloned()));
    }

    let converter = Converter::new(&catalog, &config);
    let extractor = Extractor::new(&catalog);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failures = 0;
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = if cli.extract.is_empty() {
            compile(line, &cli.model, &catalog, &converter, &base)
        } else {
            extract(line, &cli.model, &catalog, &extractor, &cli.extract)
        };

        match result {
            Ok(text) => writeln!(out, "{text}")?,
            Err(e) => {
                failures += 1;
                warn!(input = line, "{e:#}");
                writeln!(out, "error: {e:#}")?;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} line(s) failed");
    }
    Ok(())
}

fn compile(
    line: &str,
    model: &str,
    catalog: &Catalog,
    converter: &Converter<'_, Catalog>,
    base: &QueryRequest,
) -> Result<String> {
    let filter = parse_lambda(line, model, catalog)?;
    Ok(converter.convert(&base.clone().filter(filter))?)
}

/// The extracted values as a JSON object of display strings.
fn extract(
    line: &str,
    model: &str,
    catalog: &Catalog,
    extractor: &Extractor<'_, Catalog>,
    names: &[String],
) -> Result<String> {
    let filter = parse_lambda(line, model, catalog)?;
    let found: HashMap<String, Vec<String>> = extractor
        .extract(&filter, model, names.iter().cloned())?
        .into_iter()
        .map(|(name, values)| (name, values.iter().map(ToString::to_string).collect()))
        .collect();
    serde_json::to_string(&found).context("serializing extracted values")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{ "models": [
                { "name": "Person", "table": "people", "properties": [
                    { "name": "Id", "type": "int" },
                    { "name": "Name", "type": "string?" }
                ] }
            ] }"#,
        )
        .expect("valid catalog")
    }

    #[test]
    fn extract_prints_json() {
        let catalog = catalog();
        let extractor = Extractor::new(&catalog);
        let names = vec!["Id".to_string()];

        let line = extract("p => p.Id == 3", "Person", &catalog, &extractor, &names).unwrap();
        assert_eq!(line, r#"{"Id":["3"]}"#);

        let err = extract("p => p.Id ==", "Person", &catalog, &extractor, &names)
            .unwrap_err();
        assert!(!format!("{err:#}").is_empty());
    }

    #[test]
    fn compile_prints_sql() {
        let catalog = catalog();
        let config = Config::default();
        let converter = Converter::new(&catalog, &config);
        let base = QueryRequest::new("Person");

        let sql = compile("p => p.Id == 3", "Person", &catalog, &converter, &base).unwrap();
        assert!(sql.contains(r#"t0."Id" = 3"#), "{sql}");
    }
}
