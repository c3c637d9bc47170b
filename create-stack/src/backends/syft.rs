use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{
    backends::{docker::DockerBackend, process::execute},
    error::{Error, Result},
    models::ImageName,
    services::{BomGenerator, ImageClient},
};

pub const LABEL_SBOM: &str = "io.buildpacks.base.sbom";

const SBOM_DIR: &str = "/cnb/sbom";
const SYFT_EXTENSION: &str = "syft.json";
const CYCLONEDX_EXTENSION: &str = "cdx.json";

/// Catalogs images with the `syft` CLI and bakes the results into a layer.
pub struct SyftBomGenerator {
    docker: DockerBackend,
    program: PathBuf,
}

impl SyftBomGenerator {
    pub fn new(docker: DockerBackend) -> SyftBomGenerator {
        SyftBomGenerator {
            docker,
            program: PathBuf::from("syft"),
        }
    }
}

impl BomGenerator for SyftBomGenerator {
    /// Writes a Syft JSON and a CycloneDX JSON document for `image` and
    /// returns their paths. The caller owns the files.
    fn generate(&mut self, image: &ImageName) -> Result<Vec<PathBuf>> {
        info!("generating sbom for {}", image);

        let syft = tempfile::Builder::new()
            .prefix("sbom")
            .suffix(&format!(".{}", SYFT_EXTENSION))
            .tempfile()?
            .into_temp_path();
        let cyclonedx = tempfile::Builder::new()
            .prefix("sbom")
            .suffix(&format!(".{}", CYCLONEDX_EXTENSION))
            .tempfile()?
            .into_temp_path();

        execute(
            Command::new(&self.program)
                .arg(format!("docker:{}", image))
                .arg("--quiet")
                .arg("--scope")
                .arg("squashed")
                .arg("-o")
                .arg(output_option("syft-json", &syft))
                .arg("-o")
                .arg(output_option("cyclonedx-json", &cyclonedx)),
        )?;

        let syft = syft.keep().map_err(|err| err.error)?;
        let cyclonedx = cyclonedx.keep().map_err(|err| err.error)?;

        Ok(vec![syft, cyclonedx])
    }

    /// Adds `files` under `/cnb/sbom` in a new layer of `image` and labels the
    /// image with that layer's diff ID. The files are removed afterwards.
    fn attach(&mut self, image: &ImageName, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return Err(Error::Configuration("no sbom files provided".into()));
        }

        let image_id = self.docker.image_id(image)?;
        let prefix = short_digest(&image_id);

        let context_files = files
            .iter()
            .map(|file| (format!("sbom/{}", sbom_file_name(prefix, file)), file.clone()))
            .collect::<Vec<_>>();

        self.docker.amend_image(
            image,
            &[format!("COPY sbom/ {}/", SBOM_DIR)],
            &context_files,
        )?;

        let diff_id = self
            .docker
            .layer_diff_ids(image)?
            .pop()
            .ok_or_else(|| Error::Metadata(format!("{} has no layers", image)))?;
        self.docker.set_label(image, LABEL_SBOM, &diff_id)?;

        for file in files {
            if let Err(err) = fs::remove_file(file) {
                warn!("could not remove {:?}: {}", file, err);
            }
        }

        Ok(())
    }
}

fn output_option(format: &str, path: &Path) -> String {
    format!("{}={}", format, path.display())
}

/// The first eight hex digits of an image ID such as `sha256:0123abcd...`.
fn short_digest(image_id: &str) -> &str {
    let hex = image_id.rsplit(':').next().unwrap_or(image_id);
    match hex.char_indices().nth(8) {
        Some((index, _)) => &hex[..index],
        None => hex,
    }
}

/// Files named `*.syft.json` are Syft documents, everything else is treated
/// as CycloneDX.
fn sbom_file_name(prefix: &str, file: &Path) -> String {
    let is_syft = file
        .file_name()
        .map(|name| name.to_string_lossy().ends_with(SYFT_EXTENSION))
        .unwrap_or(false);
    let extension = if is_syft {
        SYFT_EXTENSION
    } else {
        CYCLONEDX_EXTENSION
    };

    format!("{}.{}", prefix, extension)
}
