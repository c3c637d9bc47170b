use chrono::{Local, SecondsFormat};
use log::info;
use serde::Serialize;

use crate::{
    error::{Result, Stage, StageContext},
    mixins::get_mixins,
    models::{BuildEngine, ImageName, ImageSpec, StackDefinition},
    services::{BomGenerator, ImageClient, PackageFinder},
};

const LABEL_PACKAGES: &str = "io.paketo.stack.packages";

/// Builds the four images of a stack, in order, and labels the CNB images
/// with what was found in their base images.
pub struct Creator {
    images: Box<dyn ImageClient>,
    packages: Box<dyn PackageFinder>,
    bom: Option<Box<dyn BomGenerator>>,
    base_image: ImageName,
}

/// What a CNB image learns from its base image.
struct BaseImageFacts<'a> {
    reference: &'a str,
    mixins: &'a [String],
    released: &'a str,
}

#[derive(Serialize)]
struct StackMetadata<'a> {
    #[serde(rename = "base-image", skip_serializing_if = "Option::is_none")]
    base_image: Option<&'a str>,
}

impl Creator {
    pub fn new<I>(images: I, packages: Box<dyn PackageFinder>, base_image: ImageName) -> Creator
    where
        I: 'static + ImageClient,
    {
        Creator {
            images: Box::new(images),
            packages,
            bom: None,
            base_image,
        }
    }

    /// Attaches an SBOM of the run base image to the run CNB image.
    pub fn with_bom_generator<G>(mut self, generator: G) -> Creator
    where
        G: 'static + BomGenerator,
    {
        self.bom = Some(Box::new(generator));
        self
    }

    pub fn execute(&mut self, definition: &StackDefinition) -> Result<()> {
        info!("pulling {}", self.base_image);
        self.images
            .pull_image(&self.base_image)
            .stage(Stage::PullBaseImage)?;

        let build_base = &definition.build_base;
        let build_reference = self
            .build_base_image(build_base)
            .stage(Stage::BuildBaseBuildImage)?;
        let build_packages = self
            .packages
            .build_packages(&build_base.name)
            .stage(Stage::QueryBuildPackages)?;
        let build_metadata = self
            .packages
            .build_package_metadata(&build_base.name)
            .stage(Stage::QueryBuildPackageMetadata)?;

        let run_base = &definition.run_base;
        let run_reference = self
            .build_base_image(run_base)
            .stage(Stage::BuildBaseRunImage)?;
        let run_packages = self
            .packages
            .run_packages(&run_base.name)
            .stage(Stage::QueryRunPackages)?;
        let run_metadata = self
            .packages
            .run_package_metadata(&run_base.name)
            .stage(Stage::QueryRunPackageMetadata)?;

        let (build_mixins, run_mixins) = get_mixins(&build_packages, &run_packages);
        info!(
            "found {} build mixins and {} run mixins",
            build_mixins.len(),
            run_mixins.len()
        );

        let released = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let build_facts = BaseImageFacts {
            reference: &build_reference,
            mixins: &build_mixins,
            released: &released,
        };
        self.build_cnb_image(build_base, &definition.build_cnb, &build_facts)
            .stage(Stage::BuildCnbBuildImage)?;
        self.label_and_push(&definition.build_cnb, &build_metadata)
            .stage(Stage::BuildCnbBuildImage)?;

        let run_facts = BaseImageFacts {
            reference: &run_reference,
            mixins: &run_mixins,
            released: &released,
        };
        self.build_cnb_image(run_base, &definition.run_cnb, &run_facts)
            .stage(Stage::BuildCnbRunImage)?;

        if let Some(bom) = self.bom.as_mut() {
            info!("attaching sbom of {} to {}", run_base.name, definition.run_cnb.name);
            let files = bom.generate(&run_base.name).stage(Stage::GenerateSbom)?;
            bom.attach(&definition.run_cnb.name, &files)
                .stage(Stage::AttachSbom)?;
        }

        self.label_and_push(&definition.run_cnb, &run_metadata)
            .stage(Stage::BuildCnbRunImage)?;

        Ok(())
    }

    /// Returns the pushed reference, or an empty string when the image is
    /// kept local.
    fn build_base_image(&mut self, image: &ImageSpec) -> Result<String> {
        info!("building {}", image.name);
        self.images.build_image(
            &image.name,
            &image.recipe,
            image.engine,
            &image.secrets,
            &image.build_args,
        )?;

        if !image.publish {
            return Ok(String::new());
        }

        info!("pushing {}", image.name);
        self.images.push_image(&image.name)
    }

    fn build_cnb_image(
        &mut self,
        base: &ImageSpec,
        image: &ImageSpec,
        facts: &BaseImageFacts<'_>,
    ) -> Result<()> {
        info!("building {}", image.name);
        let build_args = cnb_build_args(base, image, facts)?;
        self.images.build_image(
            &image.name,
            &image.recipe,
            BuildEngine::Classic,
            &Default::default(),
            &build_args,
        )
    }

    fn label_and_push(&mut self, image: &ImageSpec, package_metadata: &str) -> Result<()> {
        self.images
            .set_label(&image.name, LABEL_PACKAGES, package_metadata)?;

        if image.publish {
            info!("pushing {}", image.name);
            self.images.push_image(&image.name)?;
        }

        Ok(())
    }
}

fn cnb_build_args(
    base: &ImageSpec,
    image: &ImageSpec,
    facts: &BaseImageFacts<'_>,
) -> Result<Vec<String>> {
    let metadata = StackMetadata {
        base_image: Some(facts.reference)
            .filter(|reference| image.publish && !reference.is_empty()),
    };

    let mut build_args = vec![
        format!("base_image={}", base.name),
        format!("description={}", image.description),
        format!("mixins={}", serde_json::to_string(facts.mixins)?),
        format!("released={}", facts.released),
        format!("metadata={}", serde_json::to_string(&metadata)?),
    ];
    build_args.extend(image.build_args.iter().cloned());

    Ok(build_args)
}
