use std::process;

use env_logger::Env;
use stdinout::OrExit;

use tagtrain::pos_trainer;
use tagtrain::PosApp;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let app = PosApp::new();
    let accepted = pos_trainer::run(&app).or_exit("POS training failed", 1);

    if !accepted {
        process::exit(1);
    }
}
