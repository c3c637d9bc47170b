use log::debug;

use crate::{
    error::{Error, Result},
    models::{ImageName, PackageMetadata, SourcePackage},
    services::{ContainerRuntime, PackageFinder},
};

const LIST_FORMAT: &str = "${Package}\\n";
const METADATA_FORMAT: &str = "${binary:Package};${Version};${Architecture};${binary:Summary};${source:Package};${source:Version};${source:Upstream-Version}\\n";
const METADATA_FIELDS: usize = 7;

/// Asks `dpkg-query` inside a throwaway container of the image.
pub struct DpkgPackageFinder<R> {
    runtime: R,
}

impl<R: ContainerRuntime> DpkgPackageFinder<R> {
    pub fn new(runtime: R) -> DpkgPackageFinder<R> {
        DpkgPackageFinder { runtime }
    }

    pub fn packages(&mut self, image: &ImageName) -> Result<Vec<String>> {
        let output = self
            .runtime
            .run(image, &["dpkg-query", "-f", LIST_FORMAT, "-W"])
            .map_err(|err| Error::introspection(image, err))?;

        let packages = parse_package_list(&output);
        debug!("found {} packages in {}", packages.len(), image);

        Ok(packages)
    }

    pub fn package_metadata(&mut self, image: &ImageName) -> Result<String> {
        let output = self
            .runtime
            .run(image, &["dpkg-query", "-W", "-f", METADATA_FORMAT])
            .map_err(|err| Error::introspection(image, err))?;

        let metadata =
            parse_metadata_records(&output).map_err(|err| Error::introspection(image, err))?;

        Ok(serde_json::to_string(&metadata)?)
    }
}

impl<R: ContainerRuntime> PackageFinder for DpkgPackageFinder<R> {
    fn build_packages(&mut self, image: &ImageName) -> Result<Vec<String>> {
        self.packages(image)
    }

    fn run_packages(&mut self, image: &ImageName) -> Result<Vec<String>> {
        self.packages(image)
    }

    fn build_package_metadata(&mut self, image: &ImageName) -> Result<String> {
        self.package_metadata(image)
    }

    fn run_package_metadata(&mut self, image: &ImageName) -> Result<String> {
        self.package_metadata(image)
    }
}

fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_metadata_records(output: &str) -> Result<Vec<PackageMetadata>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields = line.split(';').collect::<Vec<_>>();
            if fields.len() < METADATA_FIELDS {
                return Err(Error::Metadata(format!(
                    "not enough fields present in metadata {}",
                    line
                )));
            }

            Ok(PackageMetadata {
                name: fields[0].into(),
                version: fields[1].into(),
                arch: fields[2].into(),
                summary: fields[3].trim().into(),
                source: SourcePackage {
                    name: fields[4].into(),
                    version: fields[5].into(),
                    upstream_version: fields[6].into(),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::testing::{Call, FakeRuntime};

    #[test]
    fn lists_one_package_per_line() {
        let runtime = FakeRuntime::default();
        runtime.set_run_output("adduser\napt\nbase-files\n\nca-certificates\n");
        let mut finder = DpkgPackageFinder::new(runtime.clone());

        let packages = finder.build_packages(&ImageName("build:base".into())).unwrap();

        assert_eq!(packages, vec!["adduser", "apt", "base-files", "ca-certificates"]);
        assert_eq!(
            runtime.calls(),
            vec![Call::Run(
                "build:base".into(),
                vec!["dpkg-query".into(), "-f".into(), "${Package}\\n".into(), "-W".into()]
            )]
        );
    }

    #[test]
    fn metadata_is_encoded_as_json() {
        let runtime = FakeRuntime::default();
        runtime.set_run_output(
            "libssl1.1:amd64;1.1.1-1ubuntu2.1~18.04.9;amd64; Secure Sockets Layer toolkit ;openssl;1.1.1-1ubuntu2.1~18.04.9;1.1.1\n\
             zlib1g:amd64;1:1.2.11.dfsg-0ubuntu2;amd64;compression library - runtime;zlib;1:1.2.11.dfsg-0ubuntu2;1.2.11.dfsg\n",
        );
        let mut finder = DpkgPackageFinder::new(runtime);

        let metadata = finder
            .run_package_metadata(&ImageName("run:base".into()))
            .unwrap();
        let metadata: Vec<PackageMetadata> = serde_json::from_str(&metadata).unwrap();

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].name, "libssl1.1:amd64");
        assert_eq!(metadata[0].summary, "Secure Sockets Layer toolkit");
        assert_eq!(metadata[0].source.name, "openssl");
        assert_eq!(metadata[0].source.upstream_version, "1.1.1");
        assert_eq!(metadata[1].version, "1:1.2.11.dfsg-0ubuntu2");
        assert_eq!(metadata[1].arch, "amd64");
    }

    #[test]
    fn short_metadata_records_are_rejected() {
        let runtime = FakeRuntime::default();
        runtime.set_run_output("bash;4.4.18-2ubuntu1.2;amd64;GNU Bourne Again SHell\n");
        let mut finder = DpkgPackageFinder::new(runtime);

        let err = finder
            .build_package_metadata(&ImageName("build:base".into()))
            .unwrap_err();

        match err {
            Error::Introspection { image, source } => {
                assert_eq!(image, ImageName("build:base".into()));
                assert!(matches!(*source, Error::Metadata(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn failed_queries_are_introspection_errors() {
        let runtime = FakeRuntime::default();
        runtime.fail_on("run");
        let mut finder = DpkgPackageFinder::new(runtime);

        let err = finder.run_packages(&ImageName("run:base".into())).unwrap_err();

        match err {
            Error::Introspection { source, .. } => {
                assert!(matches!(*source, Error::ExternalTool { .. }))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
