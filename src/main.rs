use std::path::PathBuf;

use booru_view::app::RunOptions;
use booru_view::routes::Route;

const USAGE: &str = "booru-view - Browse, score, and discuss booru posts from the terminal.

Usage: booru-view [OPTIONS] <TARGET>

  TARGET               /post/<id>, /post/<id>/edit, or a bare post id

  --offline            Browse built-in sample posts without a server
  --config <PATH>      Read configuration from PATH
  --save-credentials <USER> <TOKEN>
                       Store API credentials in the config file and exit
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = booru_view::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// `Ok(None)` means an informational flag was handled and there is nothing
/// left to run.
fn parse_args<I>(args: I) -> Result<Option<RunOptions>, String>
where
    I: Iterator<Item = String>,
{
    let mut offline = false;
    let mut config_file = None;
    let mut target: Option<String> = None;
    let mut credentials: Option<(String, String)> = None;
    let mut args = args;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("booru-view {}", booru_view::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(None);
            }
            "--offline" => offline = true,
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config_file = Some(PathBuf::from(path));
            }
            "--save-credentials" => {
                let username = args.next().ok_or("--save-credentials needs a username")?;
                let token = args.next().ok_or("--save-credentials needs a token")?;
                credentials = Some((username, token));
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ => {
                if target.replace(arg).is_some() {
                    return Err("only one target may be given".to_string());
                }
            }
        }
    }

    if let Some((username, token)) = credentials {
        let path = booru_view::config::save_credentials(config_file, &username, &token)
            .map_err(|err| err.to_string())?;
        println!("Saved credentials to {}", path.display());
        return Ok(None);
    }

    let route = match target {
        Some(target) => Route::from_target(&target).map_err(|err| err.to_string())?,
        None if offline => Route::post(1),
        None => return Err("missing target post".to_string()),
    };

    Ok(Some(RunOptions {
        route,
        offline,
        config_file,
    }))
}
