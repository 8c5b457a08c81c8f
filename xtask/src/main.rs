//! Build automation tasks for CredParse
//!
//! - `generate-cli-docs`: render the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for CredParse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<credparse_cli::Cli>();

    let content = format!(
        r#"# CredParse CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

`credparse` splits line-oriented credential dumps into a fixed number of
fields and writes each parsed line to the console, to one file per input, or
to a Postgres table. Lines without any candidate delimiter go to the error
output instead.

## Examples

```bash
# Print parsed records, errors on stderr
credparse combo.txt

# Tab-separated output files next to each input, errors in *_errors.txt
credparse dumps/*.txt -o file --errors file

# Pipe-delimited dump, three fields, earliest delimiter wins
credparse leak.txt -s '\x7c' ':' -n 3 -m lowest-index

# Insert into Postgres, committing every 5000 rows
CREDPARSE_DB_PASSWORD=secret credparse leak.txt -o database -d leaks -t credentials --commit-every 5000
```

## Options

{}

## Environment Variables

- `CREDPARSE_DB_NAME`, `CREDPARSE_DB_TABLE`, `CREDPARSE_DB_USER`, `CREDPARSE_DB_PASSWORD`,
  `CREDPARSE_DB_HOST`, `CREDPARSE_DB_PORT` - database settings (a `.env` file is read too)
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - logging, overriding `-v`

## Exit Status

- `0` - every file was processed
- `1` - at least one file could not be read, or the run failed
- `2` - invalid arguments
- `130` - interrupted twice with Ctrl+C

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
