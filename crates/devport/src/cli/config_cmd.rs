//! `config` subcommand: show current configuration and file path.

use std::path::Path;

use devport_lib::DevportError;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(init: bool, json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    if init {
        let path = config_path
            .as_deref()
            .ok_or_else(|| DevportError::Config("init: no config directory".into()))?;
        config.save_to(path)?;
        log::info!("Wrote {}", path.display());
    }
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let errors: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            valid: errors.is_empty(),
            errors,
            settings: config,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "read_timeout_ms:",
            "write_timeout_ms:",
            "hid_input_buffers:",
            "eager_report_lengths:",
            "serial:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    let timeout_label = |ms: i64| {
        if ms < 0 {
            format!("{ms} (infinite)")
        } else {
            ms.to_string()
        }
    };
    println!("Settings:");
    kv_indent("read_timeout_ms:", timeout_label(config.read_timeout_ms), w);
    kv_indent("write_timeout_ms:", timeout_label(config.write_timeout_ms), w);
    kv_indent("hid_input_buffers:", config.hid_input_buffers, w);
    kv_indent("eager_report_lengths:", config.eager_report_lengths, w);
    kv_indent("serial:", config.serial, w);

    if !errors.is_empty() {
        println!();
        println!("Problems:");
        for e in &errors {
            println!("  {e}");
        }
    }
    Ok(())
}
