use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    error::{Error, Result},
    models::{ImageName, ImageSpec, StackDefinition},
    packages::{DpkgPackageFinder, StatusDirPackageFinder},
    services::{ContainerRuntime, PackageFinder},
};

const UBUNTU_VERSION: &str = "bionic";

const BASE_BUILD_DESCRIPTION: &str =
    "ubuntu:bionic + openssl + CA certs + compilers + shell utilities";
const BASE_RUN_DESCRIPTION: &str = "ubuntu:bionic + openssl + CA certs";
const FULL_DESCRIPTION: &str = "ubuntu:bionic + many common C libraries and utilities";
const TINY_RUN_DESCRIPTION: &str = "distroless-like bionic + glibc + openssl + CA certs";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackKind {
    Base,
    Full,
    Tiny,
}

/// Inputs shared by every stack kind.
#[derive(Clone, Debug)]
pub struct StackConfig {
    pub stacks_dir: PathBuf,
    pub arch: String,
    pub build_tag: ImageName,
    pub run_tag: ImageName,
    pub publish: bool,
}

impl StackKind {
    pub const NAMES: &'static [&'static str] = &["base", "full", "tiny"];

    pub fn name(self) -> &'static str {
        match self {
            StackKind::Base => "base",
            StackKind::Full => "full",
            StackKind::Tiny => "tiny",
        }
    }

    /// Reads the package and source lists for this stack from the stacks
    /// directory and lays out its four images.
    pub fn definition(self, config: &StackConfig) -> Result<StackDefinition> {
        let dir = &config.stacks_dir;
        let sources = read_list(&dir.join("arch").join(&config.arch).join("sources.list"))?;

        let build_packages = read_list(&self.packages_dir(dir).join("build"))?;
        let mut build_args = vec![
            format!("sources={}", sources),
            format!("packages={}", build_packages),
        ];
        if self == StackKind::Base {
            build_args.insert(0, format!("ubuntu_image={}", ubuntu_image(&config.arch)));
        }

        let run_args = match self {
            StackKind::Tiny => Vec::new(),
            _ => {
                let run_packages = read_list(&self.packages_dir(dir).join("run"))?;
                let mut run_args = vec![
                    format!("sources={}", sources),
                    format!("packages={}", run_packages),
                ];
                if self == StackKind::Base {
                    run_args.insert(0, format!("ubuntu_image={}", ubuntu_image(&config.arch)));
                }
                run_args
            }
        };

        let (build_description, run_description) = match self {
            StackKind::Base => (BASE_BUILD_DESCRIPTION, BASE_RUN_DESCRIPTION),
            StackKind::Full => (FULL_DESCRIPTION, FULL_DESCRIPTION),
            StackKind::Tiny => (BASE_BUILD_DESCRIPTION, TINY_RUN_DESCRIPTION),
        };

        let run_recipes = match self {
            StackKind::Tiny => dir.join("tiny"),
            _ => dir.join(UBUNTU_VERSION),
        };
        let build_recipes = dir.join(UBUNTU_VERSION);

        Ok(StackDefinition {
            build_base: ImageSpec {
                name: config.build_tag.clone(),
                recipe: build_recipes.join("dockerfile").join("build"),
                build_args,
                publish: config.publish,
                ..Default::default()
            },
            build_cnb: ImageSpec {
                name: config.build_tag.cnb(),
                recipe: build_recipes.join("cnb").join("build"),
                description: build_description.into(),
                publish: config.publish,
                ..Default::default()
            },
            run_base: ImageSpec {
                name: config.run_tag.clone(),
                recipe: run_recipes.join("dockerfile").join("run"),
                build_args: run_args,
                publish: config.publish,
                ..Default::default()
            },
            run_cnb: ImageSpec {
                name: config.run_tag.cnb(),
                recipe: run_recipes.join("cnb").join("run"),
                description: run_description.into(),
                publish: config.publish,
                ..Default::default()
            },
        })
    }

    /// Picks the package introspection strategy for this stack's images.
    pub fn package_finder<R>(self, runtime: R) -> Box<dyn PackageFinder>
    where
        R: 'static + ContainerRuntime + Clone,
    {
        match self {
            StackKind::Base | StackKind::Full => Box::new(DpkgPackageFinder::new(runtime)),
            StackKind::Tiny => Box::new(StatusDirPackageFinder::new(runtime)),
        }
    }

    fn packages_dir(self, stacks_dir: &Path) -> PathBuf {
        let list = match self {
            StackKind::Full => "full",
            StackKind::Base | StackKind::Tiny => "base",
        };

        stacks_dir.join("packages").join(list)
    }
}

impl FromStr for StackKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<StackKind> {
        match name {
            "base" => Ok(StackKind::Base),
            "full" => Ok(StackKind::Full),
            "tiny" => Ok(StackKind::Tiny),
            other => Err(Error::Configuration(format!(
                "unknown stack {:?}, expected one of {}",
                other,
                StackKind::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The Ubuntu image stacks are built on, for the given architecture.
pub fn ubuntu_image(arch: &str) -> ImageName {
    let repository = match arch {
        "arm64" => "arm64v8/ubuntu",
        _ => "ubuntu",
    };

    ImageName(format!("{}:{}", repository, UBUNTU_VERSION))
}

/// `<destination>:<version>-<stack>`
pub fn base_tag(destination: &str, version: &str, kind: StackKind) -> ImageName {
    ImageName(format!("{}:{}-{}", destination, version, kind))
}

fn read_list(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|err| Error::Configuration(format!("failed to read {:?}: {}", path, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stacks_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let write = |path: &str, contents: &str| {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        };

        write("arch/amd64/sources.list", "deb http://archive.ubuntu.com/ubuntu bionic main\n");
        write("packages/base/build", "build-essential\nca-certificates\n");
        write("packages/base/run", "ca-certificates\n");
        write("packages/full/build", "build-essential\nimagemagick\n");
        write("packages/full/run", "imagemagick\n");
        dir
    }

    fn config(dir: &TempDir, kind: StackKind) -> StackConfig {
        StackConfig {
            stacks_dir: dir.path().to_path_buf(),
            arch: "amd64".into(),
            build_tag: base_tag("paketobuildpacks/build", "1.2.3", kind),
            run_tag: base_tag("paketobuildpacks/run", "1.2.3", kind),
            publish: true,
        }
    }

    #[test]
    fn base_stack() {
        let dir = stacks_dir();
        let definition = StackKind::Base
            .definition(&config(&dir, StackKind::Base))
            .unwrap();

        assert_eq!(
            definition.build_base.name,
            ImageName("paketobuildpacks/build:1.2.3-base".into())
        );
        assert_eq!(
            definition.build_cnb.name,
            ImageName("paketobuildpacks/build:1.2.3-base-cnb".into())
        );
        assert_eq!(
            definition.run_cnb.name,
            ImageName("paketobuildpacks/run:1.2.3-base-cnb".into())
        );
        assert_eq!(
            definition.build_base.build_args,
            vec![
                "ubuntu_image=ubuntu:bionic".to_string(),
                "sources=deb http://archive.ubuntu.com/ubuntu bionic main\n".to_string(),
                "packages=build-essential\nca-certificates\n".to_string(),
            ]
        );
        assert_eq!(
            definition.run_base.build_args[2],
            "packages=ca-certificates\n"
        );
        assert_eq!(
            definition.run_base.recipe,
            dir.path().join("bionic/dockerfile/run")
        );
        assert_eq!(definition.build_cnb.recipe, dir.path().join("bionic/cnb/build"));
        assert_eq!(definition.build_cnb.description, BASE_BUILD_DESCRIPTION);
        assert_eq!(definition.run_cnb.description, BASE_RUN_DESCRIPTION);
        assert!(definition.build_cnb.build_args.is_empty());
        assert!(definition.run_cnb.publish);
    }

    #[test]
    fn full_stack() {
        let dir = stacks_dir();
        let definition = StackKind::Full
            .definition(&config(&dir, StackKind::Full))
            .unwrap();

        assert_eq!(
            definition.build_base.build_args,
            vec![
                "sources=deb http://archive.ubuntu.com/ubuntu bionic main\n".to_string(),
                "packages=build-essential\nimagemagick\n".to_string(),
            ]
        );
        assert_eq!(definition.run_base.build_args[1], "packages=imagemagick\n");
        assert_eq!(definition.build_cnb.description, FULL_DESCRIPTION);
        assert_eq!(definition.run_cnb.description, FULL_DESCRIPTION);
    }

    #[test]
    fn tiny_stack() {
        let dir = stacks_dir();
        let definition = StackKind::Tiny
            .definition(&config(&dir, StackKind::Tiny))
            .unwrap();

        assert_eq!(
            definition.build_base.build_args[1],
            "packages=build-essential\nca-certificates\n"
        );
        assert!(definition.run_base.build_args.is_empty());
        assert_eq!(definition.build_base.recipe, dir.path().join("bionic/dockerfile/build"));
        assert_eq!(definition.run_base.recipe, dir.path().join("tiny/dockerfile/run"));
        assert_eq!(definition.run_cnb.recipe, dir.path().join("tiny/cnb/run"));
        assert_eq!(definition.run_cnb.description, TINY_RUN_DESCRIPTION);
    }

    #[test]
    fn missing_lists_are_configuration_errors() {
        let dir = stacks_dir();
        let mut config = config(&dir, StackKind::Base);
        config.arch = "ppc64le".into();

        assert!(matches!(
            StackKind::Base.definition(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn stack_names() {
        for name in StackKind::NAMES {
            assert_eq!(name.parse::<StackKind>().unwrap().name(), *name);
        }
        assert!(matches!(
            "bionic".parse::<StackKind>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn ubuntu_images_per_arch() {
        assert_eq!(ubuntu_image("amd64"), ImageName("ubuntu:bionic".into()));
        assert_eq!(ubuntu_image("arm64"), ImageName("arm64v8/ubuntu:bionic".into()));
    }
}
