use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::args::compose_arguments;
use crate::error::{PackageError, Result};
use crate::manifest::validate_name;
use crate::types::PackageDefinition;

/// Entry files starting with one of these are resolved inside the run directory.
const RELATIVE_MARKERS: [&str; 2] = ["./", ".\\"];

/// One package prepared for one run: where it is extracted and how to start it.
///
/// The run directory is `<temp_root>/Temp/<package>/<run_id>` with a random
/// `run_id`, so concurrent runs of the same package never share files.
/// The directory is removed by [`dispose`](Self::dispose) or, at the latest,
/// when the staging value is dropped.
pub struct PackageRunStaging<'a> {
    package: &'a PackageDefinition,
    pub run_id: String,
    pub run_directory: PathBuf,
    /// Program to launch.
    pub file_name: PathBuf,
    /// Static manifest arguments followed by the caller's arguments.
    pub arguments: String,
    disposed: bool,
}

impl<'a> PackageRunStaging<'a> {
    /// Compute paths and arguments. Touches nothing on disk.
    ///
    /// Fails with `Validation { field: "name" }` when the package name would
    /// place the run directory outside `<temp_root>/Temp`.
    pub fn prepare(
        package: &'a PackageDefinition,
        temp_root: impl AsRef<Path>,
        caller_arguments: &str,
    ) -> Result<Self> {
        validate_name(&package.name)?;
        let run_id = Uuid::new_v4().simple().to_string();
        let staging_root = temp_root.as_ref().join("Temp");
        let run_directory = staging_root.join(&package.name).join(&run_id);
        let contained = run_directory
            .strip_prefix(&staging_root)
            .is_ok_and(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))));
        if !contained {
            return Err(PackageError::Validation {
                field: "name".to_string(),
            });
        }

        let file_name = resolve_entry_file(&package.entry_file, &run_directory);
        let arguments = compose_arguments(&package.static_arguments, caller_arguments);

        Ok(Self {
            package,
            run_id,
            run_directory,
            file_name,
            arguments,
            disposed: false,
        })
    }

    /// Unzip the package into the run directory, creating it if needed.
    ///
    /// Existing content is not cleared; every staging gets a fresh directory.
    pub fn extract(&self) -> Result<()> {
        std::fs::create_dir_all(&self.run_directory)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(self.package.content.as_slice()))?;
        archive.extract(&self.run_directory)?;
        debug!(
            package = %self.package.name,
            dir = %self.run_directory.display(),
            files = archive.len(),
            "package extracted"
        );
        Ok(())
    }

    /// Recursively delete the run directory. Errors are logged and ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        match std::fs::remove_dir_all(&self.run_directory) {
            Ok(()) => debug!(dir = %self.run_directory.display(), "staging directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                dir = %self.run_directory.display(),
                error = %e,
                "failed to remove staging directory"
            ),
        }
    }
}

impl Drop for PackageRunStaging<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn resolve_entry_file(entry_file: &str, run_directory: &Path) -> PathBuf {
    RELATIVE_MARKERS
        .iter()
        .find_map(|marker| entry_file.strip_prefix(marker))
        .map(|relative| run_directory.join(relative))
        .unwrap_or_else(|| PathBuf::from(entry_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(entry_file: &str, static_arguments: &str) -> PackageDefinition {
        named("p1", entry_file, static_arguments)
    }

    fn named(name: &str, entry_file: &str, static_arguments: &str) -> PackageDefinition {
        PackageDefinition {
            name: name.into(),
            author: "ops".into(),
            version: "1.0".into(),
            description: "test".into(),
            entry_file: entry_file.into(),
            static_arguments: static_arguments.into(),
            content: Vec::new(),
            modified_at: String::new(),
        }
    }

    #[test]
    fn relative_entry_resolves_under_run_directory() {
        let pkg = package("./run.sh", "--x");
        let staging = PackageRunStaging::prepare(&pkg, "/tmp/root", "--y").unwrap();

        assert!(staging.run_directory.starts_with("/tmp/root/Temp/p1"));
        assert_eq!(staging.file_name, staging.run_directory.join("run.sh"));
        assert_eq!(staging.arguments, "--x --y");
    }

    #[test]
    fn absolute_entry_is_used_as_is() {
        let pkg = package("/usr/bin/python3", "");
        let staging = PackageRunStaging::prepare(&pkg, "/tmp/root", "main.py").unwrap();

        assert_eq!(staging.file_name, PathBuf::from("/usr/bin/python3"));
        assert_eq!(staging.arguments, "main.py");
    }

    #[test]
    fn each_prepare_gets_its_own_directory() {
        let pkg = package("./run.sh", "");
        let a = PackageRunStaging::prepare(&pkg, "/tmp/root", "").unwrap();
        let b = PackageRunStaging::prepare(&pkg, "/tmp/root", "").unwrap();
        assert_ne!(a.run_directory, b.run_directory);
    }

    #[test]
    fn dispose_of_missing_directory_is_silent() {
        let pkg = package("./run.sh", "");
        let mut staging = PackageRunStaging::prepare(&pkg, "/nonexistent/jobhost", "").unwrap();
        staging.dispose();
        staging.dispose();
    }

    #[test]
    fn names_that_leave_the_staging_root_are_refused() {
        for name in ["../../../etc", "/var/lib", "..", ".", "", "a/b", "a\\b"] {
            let pkg = named(name, "./run.sh", "");
            match PackageRunStaging::prepare(&pkg, "/tmp/root", "") {
                Err(PackageError::Validation { field }) => assert_eq!(field, "name"),
                Ok(staging) => panic!("`{name}` staged at {}", staging.run_directory.display()),
                Err(other) => panic!("unexpected error for `{name}`: {other}"),
            };
        }
    }
}
