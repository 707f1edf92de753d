mod canvas;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use easel_contracts::config::{apply_config_defaults, ConfigStore, DEFAULT_CONFIG_FILE};
use easel_contracts::credentials::{resolve_credential, CredentialSources};
use easel_contracts::history::{HistoryLog, DEFAULT_HISTORY_FILE};
use easel_contracts::presets::{apply_preset, Preset};
use easel_contracts::providers::ProviderRegistry;
use easel_contracts::request::{
    BoundingBox, Capability, GenerationRequest, ImageSize, MaskMode, MaskSpec, PlacementSpec,
    PositionMode, ScaleMode, Viewport,
};
use easel_engine::{Backend, OperationContext, OperationReport, Orchestrator, SaveOptions};
use tracing_subscriber::EnvFilter;

use crate::canvas::{parse_bounding_box, parse_viewport, DirectoryCanvas};

#[derive(Debug, Parser)]
#[command(name = "easel", version, about = "Generate and edit images with hosted or local models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one generate/edit/variation/img2img operation.
    Run(RunArgs),
    /// List providers with their models, sizes and operations.
    Providers,
    /// Print recent history entries.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Defaults to the config file's `default_provider`.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long, default_value = "generate")]
    operation: Capability,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    negative_prompt: Option<String>,
    #[arg(long, default_value = "")]
    edit_instruction: String,
    #[arg(long, default_value = "dall-e-3")]
    model: String,
    #[arg(long, default_value = "1024x1024")]
    size: String,
    /// Overrides --size with an arbitrary WIDTHxHEIGHT.
    #[arg(long)]
    custom_size: Option<ImageSize>,
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    seed: i64,
    #[arg(long, default_value_t = 1)]
    batch: u32,
    #[arg(long, default_value_t = 7.0)]
    guidance_scale: f64,
    #[arg(long, default_value_t = 30)]
    steps: u32,
    #[arg(long, default_value_t = 0.75)]
    strength: f64,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    preset: Option<Preset>,

    #[arg(long, default_value = "full")]
    mask_mode: String,
    #[arg(long, default_value_t = 0)]
    mask_feather: u32,
    #[arg(long, default_value_t = 0.5)]
    mask_opacity: f64,
    #[arg(long)]
    use_selection_as_mask: bool,

    #[arg(long, default_value = "center")]
    position: String,
    #[arg(long, default_value = "original")]
    scale: String,
    #[arg(long, default_value_t = 800.0)]
    custom_width: f64,
    #[arg(long, default_value_t = 600.0)]
    custom_height: f64,

    /// Canvas directory receiving images and canvas.json.
    #[arg(long)]
    out: PathBuf,
    /// Selected image: path, file:// URI, http(s) URL or data URI.
    #[arg(long)]
    input: Option<String>,
    /// Selected shape as left,top,right,bottom. Repeatable.
    #[arg(long = "shape", value_parser = parse_bounding_box)]
    shapes: Vec<BoundingBox>,
    #[arg(long, default_value = "800x600", value_parser = parse_viewport)]
    viewport: Viewport,

    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    no_env_key: bool,
    #[arg(long)]
    no_config_key: bool,
    /// Store --api-key in the config file for later runs.
    #[arg(long)]
    save_api_key: bool,
    #[arg(long)]
    proxy: Option<String>,
    /// Base URL or full /sdapi/ route of a local server.
    #[arg(long)]
    local_endpoint: Option<String>,

    /// Write every result under --save-dir or the configured directory.
    #[arg(long)]
    save_to_disk: bool,
    #[arg(long)]
    save_dir: Option<PathBuf>,
    #[arg(long, default_value = "ai_image")]
    save_prefix: String,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    history: PathBuf,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    history: PathBuf,
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easel error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EASEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_operation(args),
        Command::Providers => {
            print!("{}", describe_providers(&ProviderRegistry::default()));
            Ok(0)
        }
        Command::History(args) => {
            let log = HistoryLog::load(&args.history);
            let entries = log.entries();
            let skip = entries.len().saturating_sub(args.limit);
            for entry in &entries[skip..] {
                println!(
                    "{}  {:<9} {:<10} {:<16} {:<10} seed={}  {}",
                    entry.timestamp,
                    entry.operation,
                    entry.provider,
                    entry.model,
                    entry.size,
                    entry.seed,
                    entry.prompt
                );
            }
            Ok(0)
        }
    }
}

fn run_operation(args: RunArgs) -> Result<i32> {
    let mut config = ConfigStore::load(&args.config);
    let provider = args
        .provider
        .clone()
        .or_else(|| config.get_non_empty("default_provider").map(str::to_string))
        .unwrap_or_else(|| "openai".to_string());
    let descriptor = ProviderRegistry::default().resolve(&provider)?;

    if args.save_api_key {
        let (Some(key), Some(config_key)) = (args.api_key.as_deref(), descriptor.config_key)
        else {
            bail!("--save-api-key needs --api-key and a provider that takes one");
        };
        config.set(config_key, key.trim());
        config.save_or_warn();
    }

    let mut request = build_request(&args);
    apply_config_defaults(&mut request, descriptor.kind, &config);

    let sources = CredentialSources {
        explicit: args.api_key.as_deref(),
        use_env: !args.no_env_key,
        use_config: !args.no_config_key,
    };
    let context = OperationContext {
        credential: resolve_credential(descriptor, &sources, &config)?,
        proxy: args.proxy.clone().filter(|proxy| !proxy.trim().is_empty()),
        local_endpoint: args
            .local_endpoint
            .clone()
            .filter(|endpoint| !endpoint.trim().is_empty()),
    };

    let mut canvas = DirectoryCanvas::open(&args.out, args.viewport)?;
    if let Some(input) = &args.input {
        canvas.select_image(input.clone());
    }
    canvas.select_shapes(args.shapes.iter().copied());

    let save = save_options(&args, &config)?;
    let orchestrator = Orchestrator::for_context(&context)?.with_save(save);
    let report = orchestrator
        .run(descriptor, &request, &context, &mut canvas)
        .with_context(|| format!("{} {} failed", descriptor.display_name, request.operation))?;

    let mut history = HistoryLog::load(&args.history);
    history.append(report.history.iter().cloned());

    print!("{}", summarize(&report, &canvas));
    Ok(0)
}

fn save_options(args: &RunArgs, config: &ConfigStore) -> Result<Option<SaveOptions>> {
    let directory = match (&args.save_dir, args.save_to_disk) {
        (Some(directory), _) => directory.clone(),
        (None, false) => return Ok(None),
        (None, true) => match config.get_non_empty("default_save_directory") {
            Some(directory) => PathBuf::from(directory),
            None => bail!("--save-to-disk needs --save-dir or default_save_directory in the config"),
        },
    };
    Ok(Some(SaveOptions {
        directory,
        prefix: args.save_prefix.clone(),
    }))
}

fn build_request(args: &RunArgs) -> GenerationRequest {
    let mut request = GenerationRequest::new(args.operation, args.prompt.trim())
        .with_edit_instruction(args.edit_instruction.trim())
        .with_model(args.model.trim())
        .with_size(args.size.trim())
        .with_seed(args.seed)
        .with_batch_count(args.batch)
        .with_strength(args.strength)
        .with_mask(MaskSpec {
            mode: MaskMode::from_name(&args.mask_mode),
            feather_radius: args.mask_feather,
            opacity: args.mask_opacity,
        })
        .with_placement(PlacementSpec {
            position: PositionMode::from_name(&args.position),
            scale: ScaleMode::from_name(&args.scale),
            custom_width: args.custom_width,
            custom_height: args.custom_height,
        });
    request.custom_size = args.custom_size;
    request.guidance_scale = args.guidance_scale;
    request.steps = args.steps;
    request.use_selection_as_mask = args.use_selection_as_mask;
    if let Some(negative) = &args.negative_prompt {
        request.negative_prompt = negative.trim().to_string();
    }

    match args.preset {
        // Explicit values win; the preset fills whatever was left unset.
        Some(preset) => {
            request.quality = args.quality.clone().unwrap_or_default();
            request.style = args.style.clone().unwrap_or_default();
            apply_preset(&mut request, preset);
        }
        None => {
            if let Some(quality) = &args.quality {
                request.quality = quality.clone();
            }
            if let Some(style) = &args.style {
                request.style = style.clone();
            }
        }
    }
    request
}

fn describe_providers(registry: &ProviderRegistry) -> String {
    let mut out = String::new();
    for name in registry.list() {
        let Some(descriptor) = registry.get(&name) else {
            continue;
        };
        let operations = Backend::for_provider(descriptor)
            .capabilities()
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let sizes = descriptor
            .sizes
            .iter()
            .map(ImageSize::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("{} ({})\n", descriptor.name, descriptor.display_name));
        out.push_str(&format!("  operations: {operations}\n"));
        out.push_str(&format!("  models:     {}\n", descriptor.models.join(", ")));
        out.push_str(&format!("  sizes:      {sizes}\n"));
        if let Some(env_key) = descriptor.env_key {
            out.push_str(&format!("  credential: {env_key}\n"));
        }
    }
    out
}

fn summarize(report: &OperationReport, canvas: &DirectoryCanvas) -> String {
    let mut out = format!(
        "{} via {} ({}, {})\n",
        report.operation, report.provider, report.model, report.size
    );
    for result in &report.results {
        let path = canvas
            .element_path(result.element.as_str())
            .unwrap_or_else(|| canvas.root().join(result.element.as_str()));
        out.push_str(&format!(
            "  {} -> {} ({} bytes)",
            result.element.as_str(),
            path.display(),
            result.byte_len
        ));
        if let Some(placement) = result.placement {
            out.push_str(&format!(
                " at {},{} {}x{}",
                placement.x, placement.y, placement.width, placement.height
            ));
        }
        if let Some(saved) = &result.saved_path {
            out.push_str(&format!(", saved {}", saved.display()));
        }
        out.push('\n');
    }
    for failure in &report.failures {
        out.push_str(&format!(
            "  item {} failed: {}\n",
            failure.index + 1,
            failure.message
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["easel", "run", "--out", "canvas"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_args_map_onto_request() {
        let args = parse_run(&[
            "--operation",
            "img2img",
            "--prompt",
            "  a lighthouse at dusk ",
            "--seed",
            "42",
            "--batch",
            "9",
            "--custom-size",
            "640x480",
            "--mask-mode",
            "top-half",
            "--position",
            "bottom-right",
            "--scale",
            "fit-canvas",
            "--shape",
            "10,10,110,60",
            "--viewport",
            "1280x720",
        ]);
        assert_eq!(args.shapes, vec![BoundingBox::new(10.0, 10.0, 110.0, 60.0)]);
        assert_eq!(args.viewport, Viewport::new(1280.0, 720.0));

        let request = build_request(&args);
        assert_eq!(request.operation, Capability::Img2Img);
        assert_eq!(request.prompt, "a lighthouse at dusk");
        assert_eq!(request.seed(), Some(42));
        assert_eq!(request.batch_count(), 4);
        assert_eq!(request.custom_size, Some(ImageSize::new(640, 480)));
        assert_eq!(request.mask.mode, MaskMode::TopHalf);
        assert_eq!(request.placement.position, PositionMode::BottomRight);
        assert_eq!(request.placement.scale, ScaleMode::FitCanvas);
    }

    #[test]
    fn negative_seed_is_accepted() {
        let args = parse_run(&["--seed", "-1", "--prompt", "fox"]);
        assert_eq!(build_request(&args).seed(), None);
    }

    #[test]
    fn preset_fills_only_unset_fields() {
        let args = parse_run(&["--prompt", "portrait", "--preset", "photorealistic", "--style", "vivid"]);
        let request = build_request(&args);
        assert_eq!(request.style, "vivid");
        assert_eq!(request.quality, "hd");
        assert!(request.negative_prompt.contains("cartoon"));

        let args = parse_run(&["--prompt", "portrait", "--negative-prompt", "text"]);
        let request = build_request(&args);
        assert_eq!(request.quality, "standard");
        assert_eq!(request.style, "vivid");
        assert_eq!(request.negative_prompt, "text");
    }

    #[test]
    fn unknown_operation_and_preset_are_rejected() {
        let argv = ["easel", "run", "--out", "c", "--operation", "upscale"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["easel", "run", "--out", "c", "--preset", "noir"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn provider_listing_shows_capabilities() {
        let listing = describe_providers(&ProviderRegistry::default());
        assert!(listing.contains("openai (OpenAI DALL-E)"));
        assert!(listing.contains("replicate"));
        assert!(listing.contains("operations: generate, variation, img2img"));
        assert!(listing.contains("credential: STABILITY_API_KEY"));
        assert!(!listing.contains("credential: <none>"));
    }

    #[test]
    fn save_directory_comes_from_flag_or_config() -> anyhow::Result<()> {
        let mut config = ConfigStore::in_memory();
        let args = parse_run(&["--prompt", "fox"]);
        assert_eq!(save_options(&args, &config)?, None);

        let args = parse_run(&["--save-to-disk"]);
        assert!(save_options(&args, &config).is_err());

        config.set("default_save_directory", "/tmp/renders");
        let save = save_options(&args, &config)?.unwrap();
        assert_eq!(save.directory, PathBuf::from("/tmp/renders"));
        assert_eq!(save.prefix, "ai_image");

        let args = parse_run(&["--save-dir", "shots", "--save-prefix", "fox"]);
        let save = save_options(&args, &config)?.unwrap();
        assert_eq!(save.directory, PathBuf::from("shots"));
        assert_eq!(save.prefix, "fox");
        Ok(())
    }

    #[test]
    fn summary_lists_results_and_failed_items() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut canvas = DirectoryCanvas::open(temp.path(), Viewport::new(800.0, 600.0))?;
        let placement = easel_engine::Placement {
            x: 0.0,
            y: 0.0,
            width: 1024.0,
            height: 1024.0,
        };
        let element = easel_engine::Document::insert_image(&mut canvas, b"png", placement)?;
        let report = OperationReport {
            operation: Capability::Generate,
            provider: "stability",
            model: "sdxl".to_string(),
            size: ImageSize::square(1024),
            results: vec![easel_engine::orchestrator::OperationResult {
                element,
                placement: Some(placement),
                saved_path: None,
                byte_len: 3,
            }],
            failures: vec![easel_engine::ItemFailure {
                index: 1,
                message: "API error: content policy".to_string(),
            }],
            history: Vec::new(),
        };

        let summary = summarize(&report, &canvas);
        assert!(summary.starts_with("generate via stability (sdxl, 1024x1024)"));
        assert!(summary.contains("image_001 ->"));
        assert!(summary.contains("item 2 failed: API error: content policy"));
        Ok(())
    }

    #[test]
    fn short_prompt_fails_before_any_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("canvas");
        let config = temp.path().join("config.json");
        let history = temp.path().join("history.json");
        let mut args = parse_run(&["--provider", "local", "--prompt", "x"]);
        args.out = out;
        args.config = config;
        args.history = history.clone();

        let err = run_operation(args).unwrap_err();
        assert!(format!("{err:#}").contains("Please provide a description"));
        assert!(!history.exists());
        Ok(())
    }

    #[test]
    fn save_api_key_writes_config() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = temp.path().join("config.json");
        let mut args = parse_run(&[
            "--provider",
            "stability",
            "--api-key",
            "sk-saved",
            "--save-api-key",
            "--prompt",
            "no",
        ]);
        args.out = temp.path().join("canvas");
        args.config = config.clone();
        args.history = temp.path().join("history.json");

        // Validation fails after the key has been stored.
        assert!(run_operation(args).is_err());
        let stored = ConfigStore::load(&config);
        assert_eq!(stored.get("stability_api_key"), Some("sk-saved"));
        Ok(())
    }
}
