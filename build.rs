use std::env;
use std::fs;
use std::path::PathBuf;

/// Values baked into the firmware image, overridable from the build environment
const VALUES: &[(&str, &str, &str, &str)] = &[
    (
        "CLOUDLOCKR_RESPONSE_DELAY_MS",
        "RESPONSE_DELAY_MS",
        "u32",
        "1000",
    ),
    (
        "CLOUDLOCKR_STORAGE_HOST",
        "STORAGE_HOST",
        "&str",
        "cloudlockr.herokuapp.com",
    ),
];

fn main() {
    let mut values = String::new();

    for (var, name, ty, default) in VALUES {
        println!("cargo:rerun-if-env-changed={}", var);
        let value = env::var(var).unwrap_or_else(|_| (*default).to_string());
        let literal = if *ty == "&str" {
            format!("{:?}", value)
        } else {
            value
        };
        values.push_str(&format!(
            "#[allow(dead_code)]\npub const {}: {} = {};\n",
            name, ty, literal
        ));
    }

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_path.join("values.rs"), values).expect("Couldn't write build values!");
}
