use log::info;
use number_prefix::NumberPrefix;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};
use tar::{Builder as TarBuilder, Header};
use tempfile::TempDir;

use crate::error::{Error, Result};

/// A build context assembled into a tar archive, for builds that don't have
/// a recipe directory of their own.
pub struct ContextArchive {
    temp_dir: TempDir,
    path: PathBuf,
    tar: TarBuilder<File>,
    size: u64,
}

/// A finished archive. The file is removed when this is dropped.
pub struct ArchivedContext {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl ContextArchive {
    pub fn new() -> Result<ContextArchive> {
        let temp_dir = tempfile::Builder::new().prefix("create-stack").tempdir()?;
        let path = temp_dir.path().join("context.tar");
        let file = {
            let mut options = OpenOptions::new();
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            options.write(true).create(true).open(&path)?
        };

        Ok(ContextArchive {
            temp_dir,
            path,
            tar: TarBuilder::new(file),
            size: 0,
        })
    }

    pub fn append_data(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);

        self.tar.append_data(&mut header, name, contents)?;
        self.size += contents.len() as u64;

        Ok(())
    }

    pub fn append_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        let path = path.as_ref();
        self.tar.append_path_with_name(path, name)?;
        self.size += path.metadata()?.len();

        Ok(())
    }

    pub fn finish(mut self) -> Result<ArchivedContext> {
        self.tar.finish()?;

        match NumberPrefix::binary(self.size as f32) {
            NumberPrefix::Standalone(bytes) => info!("archived build context ({} bytes)", bytes),
            NumberPrefix::Prefixed(prefix, n) => {
                info!("archived build context ({:.1} {}B)", n, prefix)
            }
        };

        Ok(ArchivedContext {
            _temp_dir: self.temp_dir,
            path: self.path,
        })
    }
}

impl ArchivedContext {
    pub fn open(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }
}

/// Quotes a value for a Dockerfile `LABEL` instruction. Values are stored
/// verbatim, so raw line breaks, which a Dockerfile can't carry, are refused.
pub fn quote_label_value(value: &str) -> Result<String> {
    if value.contains(|c| c == '\n' || c == '\r') {
        return Err(Error::Metadata(
            "label values must not contain line breaks".into(),
        ));
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');

    for c in value.chars() {
        if let '"' | '\\' | '$' = c {
            quoted.push('\\');
        }
        quoted.push(c);
    }

    quoted.push('"');
    Ok(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Read};
    use tar::Archive;

    #[test]
    fn archives_data_and_files() {
        let source_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("bom.syft.json");
        fs::write(&source, b"{\"artifacts\":[]}").unwrap();

        let mut archive = ContextArchive::new().unwrap();
        archive.append_data("Dockerfile", b"FROM scratch\n").unwrap();
        archive.append_file("sbom/abcd1234.syft.json", &source).unwrap();
        let archived = archive.finish().unwrap();

        let mut entries = Vec::new();
        let mut tar = Archive::new(archived.open().unwrap());
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().display().to_string();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            entries.push((name, contents));
        }

        assert_eq!(
            entries,
            vec![
                ("Dockerfile".to_string(), "FROM scratch\n".to_string()),
                (
                    "sbom/abcd1234.syft.json".to_string(),
                    "{\"artifacts\":[]}".to_string()
                ),
            ]
        );
    }

    #[test]
    fn archive_is_removed_on_drop() {
        let archive = ContextArchive::new().unwrap();
        let archived = archive.finish().unwrap();
        let path = archived.path.clone();
        assert!(path.exists());

        drop(archived);
        assert!(!path.exists());
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(quote_label_value("[]").unwrap(), r#""[]""#);
        assert_eq!(
            quote_label_value(r#"[{"summary":"say \"hi\" for $5"}]"#).unwrap(),
            r#""[{\"summary\":\"say \\\"hi\\\" for \$5\"}]""#
        );
    }

    #[test]
    fn label_values_with_line_breaks_are_refused() {
        assert!(matches!(
            quote_label_value("two\nlines"),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            quote_label_value("carriage\rreturn"),
            Err(Error::Metadata(_))
        ));
    }
}
