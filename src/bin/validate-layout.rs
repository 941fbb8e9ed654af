use std::fs;
use std::path::Path;
use std::process;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use trellis::LayoutSchema;

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Options {
    #[arrrg(flag, "Enable verbose output showing pass/fail for each file")]
    verbose: bool,
}

fn main() {
    let (options, free) =
        Options::from_command_line("USAGE: validate-layout [--verbose] <file>...");

    if free.is_empty() {
        process::exit(1);
    }

    let mut all_valid = true;

    for path in &free {
        let stem = Path::new(path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("layout");

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                if options.verbose {
                    println!("{} fail", path);
                }
                all_valid = false;
                continue;
            }
        };

        match LayoutSchema::parse_with_name(stem, &content) {
            Ok(_) => {
                if options.verbose {
                    println!("{} pass", path);
                }
            }
            Err(_) => {
                if options.verbose {
                    println!("{} fail", path);
                }
                all_valid = false;
            }
        }
    }

    if all_valid {
        process::exit(0);
    } else {
        process::exit(1);
    }
}
