use clap::Parser;
use log::debug;

use docent::Opts;
use docent::cli::SubCommandExtend;
use docent::config::SubCommand;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    debug!("conf dir: {}", opts.conf_dir);

    match &opts.subcmd {
        SubCommand::Identify(config) => config.run(&opts),
        SubCommand::Gaze(config) => config.run(&opts),
        SubCommand::Resolve(config) => config.run(&opts),
        SubCommand::Build(config) => config.run(&opts),
        SubCommand::Collect(config) => config.run(&opts),
        SubCommand::Train(config) => config.run(&opts),
        SubCommand::Overlap(config) => config.run(&opts),
        SubCommand::Run(config) => config.run(&opts),
    }
}
