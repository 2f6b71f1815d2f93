use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::{env, fs};

static CONFIGS: &[(&str, usize)] = &[
    // name, default
    ("ADV_QUEUE_SIZE", 5),
    ("EVENT_QUEUE_SIZE", 8),
    ("CONN_PARAMS_MAX_RETRY", 3),
    ("CONN_PARAMS_RETRY_BACKOFF_MS", 30_000),
    ("DEFAULT_ADV_INTERVAL_MS", 1010),
    ("DEFAULT_REPEAT_COUNT", 1),
    ("SCAN_REPORT_DEFAULT_MAX_LEN", 31),
];

struct ConfigState {
    value: usize,
}

fn main() {
    let crate_name = env::var("CARGO_PKG_NAME")
        .unwrap()
        .to_ascii_uppercase()
        .replace('-', "_");

    let mut configs = HashMap::new();
    for (name, default) in CONFIGS {
        configs.insert(
            *name,
            ConfigState { value: *default },
        );
    }

    let prefix = format!("{crate_name}_");
    for (var, value) in env::vars() {
        if let Some(name) = var.strip_prefix(&prefix) {
            let Some(cfg) = configs.get_mut(name) else {
                panic!("Unknown env var {var}")
            };

            let Ok(value) = value.parse::<usize>() else {
                panic!("Invalid value for env var {var}: {value}")
            };

            cfg.value = value;
        }
    }

    for (name, _) in CONFIGS {
        println!("cargo:rerun-if-env-changed={crate_name}_{name}");
    }

    let queue = configs["ADV_QUEUE_SIZE"].value;
    if queue == 0 {
        panic!("{crate_name}_ADV_QUEUE_SIZE must be at least 1");
    }
    let events = configs["EVENT_QUEUE_SIZE"].value;
    if events == 0 {
        panic!("{crate_name}_EVENT_QUEUE_SIZE must be at least 1");
    }

    let mut data = String::new();
    for (name, _) in CONFIGS {
        let cfg = &configs[name];
        writeln!(&mut data, "pub const {}: usize = {};", name, cfg.value).unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs").to_string_lossy().to_string();
    fs::write(out_file, data).unwrap();
}
