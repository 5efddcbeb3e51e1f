//! The `peereval init` command.

use std::path::Path;

use anyhow::Result;

use peereval_core::parser::{RUBRIC_TEMPLATE, STUDENTS_TEMPLATE};

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("peereval.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("templates/students.csv"), STUDENTS_TEMPLATE)?;
    write_if_missing(Path::new("templates/rubric.csv"), RUBRIC_TEMPLATE)?;

    println!("\nNext steps:");
    println!("  1. Edit peereval.toml (mail server, base_url)");
    println!("  2. Run: peereval students import templates/students.csv");
    println!("  3. Run: peereval rubric import templates/rubric.csv --name \"Team Project\"");
    println!("  4. Run: peereval round start --rubric 1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# peereval configuration

database = "./peereval.sqlite"
base_url = "http://localhost:5000"

# Without server, username and password, messages go to the outbox
# (`peereval outbox`).
[mail]
# server = "smtp.example.edu"
port = 587
# username = "${MAIL_USERNAME}"
# password = "${MAIL_PASSWORD}"
use_tls = true
sender = "Peer Eval <no-reply@example.com>"

# Comment summaries use the local summarizer unless an API key is set.
[summarizer]
# api_key = "${OPENAI_API_KEY}"
model = "gpt-3.5-turbo"

[report]
aggregation = "mean"   # mean | median | trimmed_mean
trim_fraction = 0.1
summary_concurrency = 4   # summarizer calls in flight at once

# [report.curve]
# protect_threshold = 80
# k = 0.5
"#;
