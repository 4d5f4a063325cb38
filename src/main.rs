use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{debug, info};
use serde::Deserialize;

use report_forge::document::TemplateBlock;
use report_forge::pipeline::STEPS;
use report_forge::services::{
    HttpImageFetcher, ImageFetcher, MemoryContentSource, MemoryDrive, ReportInputs,
    StaticImageFetcher,
};
use report_forge::{ConfigError, ForgeConfig, Orchestrator, RunOptions, RunRequest, Services};

const USAGE: &str =
    "usage: report-forge <fixture.json> [--from STEP] [--stop-after STEP] [--grid N] | --list-steps";

/// A self-contained run: template, inputs and optionally known image sizes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    #[serde(default = "default_report_id")]
    report_id: String,
    template: Vec<TemplateBlock>,
    inputs: ReportInputs,
    /// URL -> [width, height]. Without it images are fetched over HTTP.
    #[serde(default)]
    images: Option<BTreeMap<String, (u32, u32)>>,
}

fn default_report_id() -> String {
    "fixture".to_string()
}

fn load_fixture(path: &Path) -> anyhow::Result<Fixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid fixture {}", path.display()))
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    fixture: Option<String>,
    start_step: Option<String>,
    options: RunOptions,
    list_steps: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list-steps" => parsed.list_steps = true,
            "--from" => parsed.start_step = Some(args.next().context("--from needs a step name")?),
            "--stop-after" => {
                parsed.options.stop_after = Some(args.next().context("--stop-after needs a step name")?)
            }
            "--grid" => {
                let value = args.next().context("--grid needs a number")?;
                parsed.options.grid_width =
                    Some(value.parse().with_context(|| format!("invalid grid width '{}'", value))?);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            path => {
                if parsed.fixture.replace(path.to_string()).is_some() {
                    bail!("only one fixture may be given\n{}", USAGE);
                }
            }
        }
    }
    Ok(parsed)
}

fn load_config() -> anyhow::Result<ForgeConfig> {
    match ForgeConfig::from_env() {
        Ok(config) => Ok(config),
        Err(ConfigError::Missing(key)) => {
            debug!("{} not set, using defaults", key);
            Ok(ForgeConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.list_steps {
        for (index, step) in STEPS.iter().enumerate() {
            let criticality = if step.is_critical() { "critical" } else { "non-critical" };
            println!("{:>2}. {:<18} {:<13} {}", index + 1, step.name, criticality, step.description);
        }
        return Ok(());
    }
    let Some(path) = args.fixture else {
        bail!("{}", USAGE);
    };

    let fixture = load_fixture(Path::new(&path))?;
    let config = load_config()?;

    let drive = Arc::new(MemoryDrive::new());
    drive.add_template(&config.template_id, &fixture.template);
    let content = Arc::new(MemoryContentSource::new());
    content.insert(&fixture.report_id, fixture.inputs);
    let images: Arc<dyn ImageFetcher> = match fixture.images {
        Some(table) => {
            let mut fetcher = StaticImageFetcher::new();
            for (url, (width, height)) in table {
                fetcher.insert(url, width, height);
            }
            Arc::new(fetcher)
        }
        None => Arc::new(
            HttpImageFetcher::new(config.fetch_timeout)
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
        ),
    };

    let orchestrator = Orchestrator::new(Services::in_memory(drive, content, images), config);
    let mut request = RunRequest::new(fixture.report_id).with_options(args.options);
    request.start_step = args.start_step;

    info!("running report '{}' from {}", request.report_id, path);
    let outcome = orchestrator.run(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(args(&["report.json", "--stop-after", "replace_fields", "--grid", "4"])).unwrap();
        assert_eq!(parsed.fixture.as_deref(), Some("report.json"));
        assert_eq!(parsed.options.stop_after.as_deref(), Some("replace_fields"));
        assert_eq!(parsed.options.grid_width, Some(4));
        assert!(!parsed.list_steps);

        assert!(parse_args(args(&["--grid", "wide"])).is_err());
        assert!(parse_args(args(&["--from"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_load_fixture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "template": ["{{{{title}}}}", {{"table": [[["{{{{gallery}}}}"]]]}}],
                "inputs": {{"title": "Vase", "galleryUrls": ["https://cdn.test/1.jpg"]}},
                "images": {{"https://cdn.test/1.jpg": [640, 480]}}
            }}"#
        )
        .unwrap();

        let fixture = load_fixture(file.path()).unwrap();
        assert_eq!(fixture.report_id, "fixture");
        assert_eq!(fixture.template.len(), 2);
        assert_eq!(fixture.inputs.title, "Vase");
        assert_eq!(
            fixture.images.unwrap().get("https://cdn.test/1.jpg"),
            Some(&(640, 480))
        );
    }

    #[test]
    fn test_load_fixture_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_fixture(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("invalid fixture"));
    }
}
