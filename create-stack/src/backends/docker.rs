use log::{debug, info};
use std::{
    collections::BTreeMap as Map,
    ffi::OsString,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{
    backends::{
        context::{quote_label_value, ArchivedContext, ContextArchive},
        process::{describe, execute},
    },
    error::{Error, Result},
    models::{BuildEngine, ContainerId, ImageName},
    services::{ContainerRuntime, ImageClient},
};

const BUILDKIT_ENV: &str = "DOCKER_BUILDKIT";

/// Talks to the local docker daemon through the `docker` CLI.
#[derive(Clone, Debug)]
pub struct DockerBackend {
    program: PathBuf,
}

impl Default for DockerBackend {
    fn default() -> Self {
        DockerBackend {
            program: PathBuf::from("docker"),
        }
    }
}

impl DockerBackend {
    /// Checks that the daemon answers before handing out a backend.
    pub fn connect() -> Result<DockerBackend> {
        let backend = DockerBackend::default();

        let version = execute(
            backend
                .command()
                .args(&["version", "--format", "{{.Server.Version}}"]),
        )?;
        info!("connected to docker {}", version.trim());

        Ok(backend)
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Builds from an archived context piped to `docker build -`.
    fn build_archive(&self, name: &ImageName, context: &ArchivedContext) -> Result<()> {
        let mut command = self.command();
        command
            .args(&["build", "-t", &name.0, "-"])
            .stdin(Stdio::from(context.open()?));

        execute(&mut command)?;
        Ok(())
    }

    /// Rebuilds `name` from itself with extra Dockerfile instructions.
    pub fn amend_image(
        &self,
        name: &ImageName,
        instructions: &[String],
        files: &[(String, PathBuf)],
    ) -> Result<()> {
        let mut dockerfile = format!("FROM {}\n", name);
        for instruction in instructions {
            dockerfile.push_str(instruction);
            dockerfile.push('\n');
        }

        let mut archive = ContextArchive::new()?;
        archive.append_data("Dockerfile", dockerfile.as_bytes())?;
        for (archive_name, path) in files {
            archive.append_file(archive_name, path)?;
        }
        let context = archive.finish()?;

        self.build_archive(name, &context)
    }

    pub fn image_id(&self, name: &ImageName) -> Result<String> {
        let output = execute(self.command().args(&[
            "image",
            "inspect",
            "--format",
            "{{.Id}}",
            &name.0,
        ]))?;

        Ok(output.trim().to_owned())
    }

    /// Diff IDs of the image's layers, bottom first.
    pub fn layer_diff_ids(&self, name: &ImageName) -> Result<Vec<String>> {
        let output = execute(self.command().args(&[
            "image",
            "inspect",
            "--format",
            "{{json .RootFS.Layers}}",
            &name.0,
        ]))?;

        Ok(serde_json::from_str(output.trim())?)
    }
}

impl ImageClient for DockerBackend {
    fn build_image(
        &mut self,
        name: &ImageName,
        recipe: &Path,
        engine: BuildEngine,
        secrets: &Map<String, String>,
        build_args: &[String],
    ) -> Result<()> {
        info!("building {} from {:?}", name, recipe);

        // Lives until the build has read the secrets.
        let secrets_dir = tempfile::Builder::new().prefix("docker-secrets").tempdir()?;
        let mut secret_files = Vec::new();
        for (id, secret) in secrets.iter() {
            let path = secrets_dir.path().join(format!("secret-{}", id));
            let mut file = {
                let mut options = OpenOptions::new();
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    options.mode(0o600);
                }
                options.write(true).create(true).open(&path)?
            };
            file.write_all(secret.as_bytes())?;
            secret_files.push((id.clone(), path));
        }

        let mut command = self.command();
        command
            .args(build_arguments(name, recipe, &secret_files, build_args))
            .env(BUILDKIT_ENV, buildkit_switch(engine));

        execute(&mut command)?;
        secrets_dir.close()?;

        Ok(())
    }

    fn push_image(&mut self, name: &ImageName) -> Result<String> {
        info!("pushing {}", name);

        let mut command = self.command();
        command.args(&["push", &name.0]);
        let output = execute(&mut command)?;

        let digest = push_digest(&output).ok_or_else(|| Error::ExternalTool {
            command: describe(&command),
            output: format!("no digest reported\n{}", output.trim()),
        })?;

        Ok(format!("{}@{}", name.repository(), digest))
    }

    fn pull_image(&mut self, name: &ImageName) -> Result<()> {
        info!("pulling {}", name);

        execute(self.command().args(&["pull", &name.0]))?;
        Ok(())
    }

    fn set_label(&mut self, name: &ImageName, key: &str, value: &str) -> Result<()> {
        debug!("setting label {} on {}", key, name);

        let instruction = format!("LABEL {}={}", key, quote_label_value(value)?);
        self.amend_image(name, &[instruction], &[])
    }
}

impl ContainerRuntime for DockerBackend {
    fn run(&mut self, image: &ImageName, command: &[&str]) -> Result<String> {
        execute(
            self.command()
                .args(&["run", "--rm", &image.0])
                .args(command),
        )
    }

    fn create_container(&mut self, image: &ImageName) -> Result<ContainerId> {
        let output = execute(self.command().args(&["create", &image.0, "sleep"]))?;

        Ok(ContainerId(output.trim().to_owned()))
    }

    fn copy_from_container(&mut self, id: &ContainerId, source: &str, dest: &Path) -> Result<()> {
        let source = format!("{}:{}", id.0, source);
        execute(self.command().arg("cp").arg(source).arg(dest))?;

        Ok(())
    }

    fn remove_container(&mut self, id: &ContainerId) -> Result<()> {
        execute(self.command().args(&["rm", &id.0]))?;

        Ok(())
    }
}

fn build_arguments(
    name: &ImageName,
    recipe: &Path,
    secret_files: &[(String, PathBuf)],
    build_args: &[String],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "build".into(),
        "-t".into(),
        name.0.clone().into(),
        "--no-cache".into(),
    ];

    for (id, path) in secret_files {
        args.push("--secret".into());
        args.push(format!("id={},src={}", id, path.display()).into());
    }

    for build_arg in build_args {
        args.push("--build-arg".into());
        args.push(build_arg.into());
    }

    args.push(recipe.into());
    args
}

/// Set on every build so the daemon's engine never comes from the caller's
/// environment.
fn buildkit_switch(engine: BuildEngine) -> &'static str {
    match engine {
        BuildEngine::Classic => "0",
        BuildEngine::BuildKit => "1",
    }
}

/// Finds the digest in the status line `docker push` ends with, e.g.
/// `1.0: digest: sha256:0123... size: 1234`.
fn push_digest(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .filter_map(|line| line.split("digest: ").nth(1))
        .filter_map(|rest| rest.split_whitespace().next())
        .next()
}
