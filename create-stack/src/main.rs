use anyhow::Result;
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    env,
    io::{stderr, stdout, Write},
    path::PathBuf,
    process,
};
use structopt::{clap::AppSettings, StructOpt};

use backends::{DockerBackend, SyftBomGenerator};
use creator::Creator;
use models::StackDefinition;
use stacks::{base_tag, ubuntu_image, StackConfig, StackKind};

mod backends;
mod creator;
mod error;
mod mixins;
mod models;
mod packages;
mod services;
mod stacks;

const ATTACH_SBOM_ENV: &str = "EXPERIMENTAL_ATTACH_RUN_IMAGE_SBOM";

#[derive(Debug, StructOpt)]
#[structopt(
    name = "create-stack",
    about = "Builds the build and run images of a buildpacks stack.",
    setting = AppSettings::DisableVersion
)]
struct Opt {
    /// Repository the build images are tagged into.
    #[structopt(long)]
    build_destination: String,

    /// Repository the run images are tagged into.
    #[structopt(long)]
    run_destination: String,

    /// Version part of every image tag.
    #[structopt(long)]
    version: String,

    #[structopt(long, possible_values = StackKind::NAMES)]
    stack: StackKind,

    /// Directory holding the recipes, package lists and sources.
    #[structopt(long, parse(from_os_str))]
    stacks_dir: PathBuf,

    #[structopt(long, default_value = "amd64")]
    arch: String,

    /// Push every image once it is built.
    #[structopt(long)]
    publish: bool,
}

impl Opt {
    fn validate(&self) -> Result<()> {
        let inputs = [
            ("--build-destination", &self.build_destination),
            ("--run-destination", &self.run_destination),
            ("--version", &self.version),
            ("--arch", &self.arch),
        ];

        for (flag, value) in inputs.iter() {
            if value.trim().is_empty() {
                return Err(error::Error::Configuration(format!("{} must not be empty", flag)).into());
            }
        }

        if self.stacks_dir.as_os_str().is_empty() {
            return Err(error::Error::Configuration("--stacks-dir must not be empty".into()).into());
        }

        Ok(())
    }
}

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    if let Err(err) = create_stack(opt) {
        if report(&mut stderr(), &err).is_err() {
            eprintln!("{:?}", err);
        }
        process::exit(1);
    }
}

fn create_stack(opt: Opt) -> Result<()> {
    let mut stdout = stdout();

    opt.validate()?;

    let config = StackConfig {
        stacks_dir: opt.stacks_dir.clone(),
        arch: opt.arch.clone(),
        build_tag: base_tag(&opt.build_destination, &opt.version, opt.stack),
        run_tag: base_tag(&opt.run_destination, &opt.version, opt.stack),
        publish: opt.publish,
    };
    let definition = opt.stack.definition(&config)?;
    info!("read {} stack from {:?}", opt.stack, opt.stacks_dir);

    let attach_sbom = env::var(ATTACH_SBOM_ENV)
        .map(|value| value == "true")
        .unwrap_or(false);

    let docker = DockerBackend::connect()?;
    info!("connected to docker");

    let packages = opt.stack.package_finder(docker.clone());
    let mut creator = Creator::new(docker.clone(), packages, ubuntu_image(&opt.arch));
    if attach_sbom {
        info!("sbom attachment enabled");
        creator = creator.with_bom_generator(SyftBomGenerator::new(docker));
    }

    creator.execute(&definition)?;

    print_summary(&mut stdout, &definition, opt.publish)
}

fn print_summary(
    stdout: &mut impl Write,
    definition: &StackDefinition,
    publish: bool,
) -> Result<()> {
    let verb = if publish { "Published" } else { "Built" };
    let images = [
        &definition.build_base,
        &definition.build_cnb,
        &definition.run_base,
        &definition.run_cnb,
    ];

    let longest_name = images
        .iter()
        .map(|image| image.name.0.len())
        .max()
        .unwrap_or(0);

    for image in images.iter() {
        stdout
            .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
            .queue(style::Print(format!(
                "{} {:width$} ",
                verb,
                image.name.0,
                width = longest_name
            )))?
            .queue(style::PrintStyledContent("done".green().bold()))?
            .queue(style::Print("\n"))?;
    }

    stdout.flush()?;

    Ok(())
}

/// Prints the error and every cause below it.
fn report(stderr: &mut impl Write, err: &anyhow::Error) -> Result<()> {
    stderr
        .queue(style::PrintStyledContent("ERROR: ".red().bold()))?
        .queue(style::Print(format!("{}\n", err)))?;

    for cause in err.chain().skip(1) {
        stderr.queue(style::Print(format!("  caused by: {}\n", cause)))?;
    }

    stderr.flush()?;

    Ok(())
}
