use std::process;

use env_logger::Env;
use stdinout::OrExit;

use tagtrain::deps_trainer;
use tagtrain::DepsApp;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let app = DepsApp::new();
    let accepted = deps_trainer::run(&app).or_exit("Parser training failed", 1);

    if !accepted {
        process::exit(1);
    }
}
