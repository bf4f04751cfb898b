//! fo-view – command-line template + model → PDF/RTF renderer.
//!
//! Usage:
//!   fo-view <template.fo> [output] --model <model.json> [--format pdf|rtf]
//!           [--config <engine.json>] [--set key=value]... [--dump-areas <file.json>]
//!
//! If `output` is omitted the document is written next to the template with
//! the same stem and the format's extension (e.g. `letter.fo` → `letter.pdf`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs, process};

use fo_view::config::{ConfigSource, EngineConfig, ViewConfig};
use fo_view::engine::EngineFactory;
use fo_view::error::render_error;
use fo_view::templates::{materialize, DataModel, MiniJinjaEngine};
use fo_view::view::DocumentView;
use fo_view::writer::OutputFormat;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut template_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut model_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut dump_path: Option<PathBuf> = None;
    let mut format = OutputFormat::Pdf;
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--model" | "-m" => model_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0]))),
            "--config" | "-c" => config_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0]))),
            "--dump-areas" => dump_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0]))),
            "--format" | "-f" => {
                format = match flag_value(&mut iter, arg, &args[0]).parse() {
                    Ok(f) => f,
                    Err(e) => fail(&format!("Error: {e}")),
                }
            }
            "--set" | "-s" => {
                let pair = flag_value(&mut iter, arg, &args[0]);
                match pair.split_once('=') {
                    Some((key, value)) => {
                        properties.insert(key.trim().to_string(), value.to_string());
                    }
                    None => fail(&format!("Error: --set expects key=value, got '{pair}'")),
                }
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    template_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let template = match template_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no template specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };
    let Some(model_path) = model_path else {
        eprintln!("Error: no model specified (--model <model.json>).");
        print_usage(&args[0]);
        process::exit(1);
    };

    let output = output_path.unwrap_or_else(|| {
        let mut o = template.clone();
        o.set_extension(format.extension());
        o
    });

    let model_text = match fs::read_to_string(&model_path) {
        Ok(s) => s,
        Err(e) => fail(&format!("Error reading '{}': {e}", model_path.display())),
    };
    let model = match serde_json::from_str::<serde_json::Value>(&model_text) {
        Ok(v) => DataModel::new(v),
        Err(e) => fail(&format!("Error parsing model '{}': {e}", model_path.display())),
    };

    let template_root = template
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let template_name = template
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| template.clone());

    let engine_source = config_path.map(ConfigSource::File).unwrap_or_default();
    let config = match ViewConfig::new(&template_root, &template_name, format)
        .with_engine_config(engine_source)
        .with_properties(&properties)
    {
        Ok(c) => c,
        Err(e) => fail(&format!("Error: {e}")),
    };

    if let Some(dump) = &dump_path {
        if let Err(e) = dump_areas(&config, &model, dump) {
            fail(&format!("Error dumping areas: {e}"));
        }
    }

    let view = DocumentView::new(config).with_model(model);
    match view.serialize_to_file(&output) {
        Ok(size) => {
            eprintln!(
                "Wrote '{}' ({} bytes, {})",
                output.display(),
                size,
                view.content_type()
            );
        }
        Err(e) => {
            let kind = render_error(&e)
                .map(|r| format!("{:?}", r.kind()).to_lowercase())
                .unwrap_or_else(|| "io".to_string());
            fail(&format!("Error generating {format} ({kind}): {e}"));
        }
    }
}

/// Lay the document out and write its area tree as JSON.
fn dump_areas(config: &ViewConfig, model: &DataModel, dump: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = EngineConfig::for_template(config.engine.clone(), &config.template_file());
    let engine = EngineFactory::shared().get_or_build(&engine_config)?;
    let templates = MiniJinjaEngine::new(&config.template_root);
    let markup = materialize(&templates, &config.template, Some(model))?;

    let mut session = engine.new_session();
    session.apply(&config.metadata);
    let tree = engine.lay_out(markup.as_str(), &session)?;
    fs::write(dump, tree.to_json()?)?;
    eprintln!("Wrote area tree '{}' ({} pages)", dump.display(), tree.pages.len());
    Ok(())
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> &'a str {
    match iter.next() {
        Some(v) => v.as_str(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn print_usage(prog: &str) {
    eprintln!("fo-view – render layout templates with a data model");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <template.fo> [output] --model <model.json> [options]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <template.fo>   Layout template; includes and images resolve next to it");
    eprintln!("  [output]        Output path  (default: template stem with the format's extension)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --model, -m     JSON data model merged into the template (required)");
    eprintln!("  --format, -f    pdf or rtf (default: pdf)");
    eprintln!("  --config, -c    Engine configuration JSON (default: built-in)");
    eprintln!("  --set, -s       Document property key=value: producer, creator, author,");
    eprintln!("                  creation-date, title, target-resolution (repeatable)");
    eprintln!("  --dump-areas    Also write the paginated area tree as JSON");
    eprintln!("  --help          Print this message");
}
