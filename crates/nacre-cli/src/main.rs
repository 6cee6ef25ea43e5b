use std::{env, fs, path::PathBuf, process::ExitCode};

use nacre::{Options, Runner};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: nacre <file.nc>");
        return ExitCode::FAILURE;
    };
    let code = match read_file(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    // packages resolve relative to the script first, then the working
    // directory
    let mut search_path = Vec::new();
    if let Some(parent) = PathBuf::from(file_path).parent() {
        if parent.as_os_str().is_empty() {
            search_path.push(PathBuf::from("."));
        } else {
            search_path.push(parent.to_path_buf());
        }
    }
    search_path.push(PathBuf::from("."));

    let mut runner = Runner::new(Options {
        search_path,
        ..Options::default()
    });

    match runner.exec_program(&code) {
        Ok(outcomes) => {
            for outcome in &outcomes {
                println!("{} : {}", runner.display_value(&outcome.value), outcome.ty);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("cannot read {file_path}: {err}"));
        }
    }
    fs::read_to_string(file_path).map_err(|err| format!("cannot read {file_path}: {err}"))
}
