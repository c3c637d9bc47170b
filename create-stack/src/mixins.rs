//! Mixin labels for a pair of build and run images.
//!
//! Packages installed in both images are listed plainly in both label values.
//! Packages present in only one image are listed only on that image, prefixed
//! with its phase (`build:` or `run:`).

pub const BUILD_PHASE: &str = "build";
pub const RUN_PHASE: &str = "run";

/// Computes `(build_mixins, run_mixins)` from the package lists of the build
/// and run images.
///
/// Shared packages come first, in build-list order, once per occurrence in
/// the build list. Phase-exclusive packages follow, tagged.
pub fn get_mixins(build_packages: &[String], run_packages: &[String]) -> (Vec<String>, Vec<String>) {
    let build_only = difference(build_packages, run_packages);
    let run_only = difference(run_packages, build_packages);

    let mut build_mixins = intersection(build_packages, run_packages);
    build_mixins.extend(tag(build_only, BUILD_PHASE));

    let mut run_mixins = intersection(build_packages, run_packages);
    run_mixins.extend(tag(run_only, RUN_PHASE));

    (build_mixins, run_mixins)
}

fn difference<'a>(left: &'a [String], right: &[String]) -> Vec<&'a String> {
    left.iter().filter(|package| !right.contains(package)).collect()
}

fn intersection(left: &[String], right: &[String]) -> Vec<String> {
    left.iter()
        .filter(|package| right.contains(package))
        .cloned()
        .collect()
}

fn tag(packages: Vec<&String>, phase: &str) -> Vec<String> {
    packages
        .into_iter()
        .map(|package| format!("{}:{}", phase, package))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn shared_packages_come_first() {
        let build = strings(&["testlib1", "testlib2", "testlib3", "testlib4", "testlib5", "testlib6"]);
        let run = strings(&["testlib1", "testlib5", "testlib6", "testlib7"]);

        let (build_mixins, run_mixins) = get_mixins(&build, &run);

        assert_eq!(
            build_mixins,
            strings(&[
                "testlib1",
                "testlib5",
                "testlib6",
                "build:testlib2",
                "build:testlib3",
                "build:testlib4",
            ])
        );
        assert_eq!(run_mixins, strings(&["testlib1", "testlib5", "testlib6", "run:testlib7"]));
    }

    #[test]
    fn shared_order_follows_build_list() {
        let (build_mixins, run_mixins) =
            get_mixins(&strings(&["a", "b", "c", "d"]), &strings(&["d", "e", "a"]));

        assert_eq!(build_mixins, strings(&["a", "d", "build:b", "build:c"]));
        assert_eq!(run_mixins, strings(&["a", "d", "run:e"]));
    }

    #[test]
    fn empty_lists() {
        let (build_mixins, run_mixins) = get_mixins(&[], &[]);

        assert!(build_mixins.is_empty());
        assert!(run_mixins.is_empty());
    }

    #[test]
    fn identical_lists_have_no_tagged_mixins() {
        let packages = strings(&["bash", "ca-certificates", "openssl"]);

        let (build_mixins, run_mixins) = get_mixins(&packages, &packages);

        assert_eq!(build_mixins, packages);
        assert_eq!(run_mixins, packages);
    }

    #[test]
    fn one_side_empty() {
        let packages = strings(&["make", "gcc"]);

        let (build_mixins, run_mixins) = get_mixins(&packages, &[]);
        assert_eq!(build_mixins, strings(&["build:make", "build:gcc"]));
        assert!(run_mixins.is_empty());

        let (build_mixins, run_mixins) = get_mixins(&[], &packages);
        assert!(build_mixins.is_empty());
        assert_eq!(run_mixins, strings(&["run:make", "run:gcc"]));
    }

    #[test]
    fn build_duplicates_repeat_in_shared() {
        let (build_mixins, run_mixins) =
            get_mixins(&strings(&["libc6", "libc6", "zlib1g"]), &strings(&["libc6", "tzdata"]));

        assert_eq!(build_mixins, strings(&["libc6", "libc6", "build:zlib1g"]));
        assert_eq!(run_mixins, strings(&["libc6", "libc6", "run:tzdata"]));
    }

    #[test]
    fn tagged_mixins_never_overlap() {
        let build = strings(&["a", "b", "c", "x"]);
        let run = strings(&["x", "y", "c"]);

        let (build_mixins, run_mixins) = get_mixins(&build, &run);

        for mixin in build_mixins.iter().filter_map(|m| m.strip_prefix("build:")) {
            assert!(!run_mixins.contains(&format!("run:{}", mixin)));
            assert!(!run.contains(&mixin.to_string()));
        }
        for shared in ["c", "x"].iter() {
            assert!(build_mixins.contains(&shared.to_string()));
            assert!(run_mixins.contains(&shared.to_string()));
        }
        assert!(!build_mixins.iter().any(|m| m.starts_with("run:")));
        assert!(!run_mixins.iter().any(|m| m.starts_with("build:")));
    }
}
