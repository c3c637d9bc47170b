use std::{fmt, io};
use thiserror::Error;

use crate::models::ImageName;

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stages of a stack build, in execution order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    PullBaseImage,
    BuildBaseBuildImage,
    QueryBuildPackages,
    QueryBuildPackageMetadata,
    BuildBaseRunImage,
    QueryRunPackages,
    QueryRunPackageMetadata,
    BuildCnbBuildImage,
    BuildCnbRunImage,
    GenerateSbom,
    AttachSbom,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Stage::PullBaseImage => "pulling base os image",
            Stage::BuildBaseBuildImage => "building base build image",
            Stage::QueryBuildPackages => "getting packages from base build image",
            Stage::QueryBuildPackageMetadata => "getting build package metadata",
            Stage::BuildBaseRunImage => "building base run image",
            Stage::QueryRunPackages => "getting packages from base run image",
            Stage::QueryRunPackageMetadata => "getting run package metadata",
            Stage::BuildCnbBuildImage => "building cnb build image",
            Stage::BuildCnbRunImage => "building cnb run image",
            Stage::GenerateSbom => "generating sbom",
            Stage::AttachSbom => "attaching sbom",
        };

        f.write_str(description)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("`{command}` failed\n{output}")]
    ExternalTool { command: String, output: String },

    #[error("package query failed for {image}")]
    Introspection {
        image: ImageName,
        #[source]
        source: Box<Error>,
    },

    #[error("unexpected package metadata: {0}")]
    Metadata(String),

    #[error("json serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("error {stage}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn introspection(image: &ImageName, source: Error) -> Error {
        Error::Introspection {
            image: image.clone(),
            source: Box::new(source),
        }
    }
}

/// Attaches a pipeline stage to the error of a fallible step.
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| Error::Stage {
            stage,
            source: Box::new(source),
        })
    }
}
