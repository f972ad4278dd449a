//! Static catalog of supported FLUX models.
//!
//! Each entry describes one hosted model: its stable identifier, display
//! name, category tag, usage notes, and accepted input fields. The table is
//! pure data, defined once and never mutated; listing order is declaration
//! order.

/// Model used when a generation request does not name one.
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-1.1-pro-ultra";

/// Output format used when a generation request does not name one.
pub const DEFAULT_OUTPUT_FORMAT: &str = "png";

/// Type of a model input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Boolean,
    Integer,
    Number,
    FileOrUrl,
}

/// Requiredness and type of a single input field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub required: bool,
    pub ty: FieldType,
}

const fn req(ty: FieldType) -> FieldSpec {
    FieldSpec { required: true, ty }
}

const fn opt(ty: FieldType) -> FieldSpec {
    FieldSpec {
        required: false,
        ty,
    }
}

/// One supported model.
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    /// Stable `owner/name` identifier on Replicate.
    pub id: &'static str,
    /// Human-readable label.
    pub display: &'static str,
    /// Open-ended category tag (e.g. "text-to-image").
    pub kind: &'static str,
    /// Usage notes shown in the model listing.
    pub notes: &'static [&'static str],
    /// Whether the model takes an input image.
    pub accepts_image: bool,
    /// Declared input fields, in declaration order.
    pub inputs: &'static [(&'static str, FieldSpec)],
}

impl ModelDescriptor {
    /// Whether the model declares an input field with this name.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|(n, _)| *n == name)
    }

    /// Declared input field names, in declaration order.
    pub fn input_names(&self) -> Vec<&'static str> {
        self.inputs.iter().map(|(n, _)| *n).collect()
    }
}

static FLUX_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "black-forest-labs/flux-1.1-pro-ultra",
        display: "FLUX1.1 Pro Ultra",
        kind: "text-to-image",
        notes: &[
            "Highest quality, up to ~4MP; 'raw' mode for realism.",
            "Use when you need best composition/large output.",
        ],
        accepts_image: false,
        inputs: &[
            ("prompt", req(FieldType::String)),
            ("raw", opt(FieldType::Boolean)),
            ("aspect_ratio", opt(FieldType::String)),
            ("seed", opt(FieldType::Integer)),
            ("output_quality", opt(FieldType::Number)),
            ("go_fast", opt(FieldType::Boolean)),
        ],
    },
    ModelDescriptor {
        id: "black-forest-labs/flux-pro",
        display: "FLUX1.1 Pro",
        kind: "text-to-image",
        notes: &["Fast, reliable, commercial-grade default when Ultra not required."],
        accepts_image: false,
        inputs: &[
            ("prompt", req(FieldType::String)),
            ("aspect_ratio", opt(FieldType::String)),
            ("seed", opt(FieldType::Integer)),
        ],
    },
    ModelDescriptor {
        id: "black-forest-labs/flux-redux-dev",
        display: "FLUX.1 Redux [dev]",
        kind: "image-variation",
        notes: &["Variations/restyling while preserving key elements; mix image + text."],
        accepts_image: true,
        inputs: &[
            ("image", req(FieldType::FileOrUrl)),
            ("prompt", req(FieldType::String)),
            ("strength", opt(FieldType::Number)),
            ("seed", opt(FieldType::Integer)),
            ("num_outputs", opt(FieldType::Integer)),
        ],
    },
    ModelDescriptor {
        id: "black-forest-labs/flux-fill-pro",
        display: "FLUX.1 Fill [pro]",
        kind: "inpainting/outpainting",
        notes: &["Professional in/outpainting; provide mask for areas to change."],
        accepts_image: true,
        inputs: &[
            ("image", req(FieldType::FileOrUrl)),
            ("mask", opt(FieldType::FileOrUrl)),
            ("prompt", req(FieldType::String)),
            ("num_inference_steps", opt(FieldType::Integer)),
            ("guidance", opt(FieldType::Number)),
            ("seed", opt(FieldType::Integer)),
        ],
    },
    ModelDescriptor {
        id: "black-forest-labs/flux-depth-dev",
        display: "FLUX.1 Depth [dev]",
        kind: "depth-guided editing",
        notes: &["Structure-preserving edits/style transfer using depth; supply an image."],
        accepts_image: true,
        inputs: &[
            ("image", req(FieldType::FileOrUrl)),
            ("prompt", req(FieldType::String)),
            ("seed", opt(FieldType::Integer)),
        ],
    },
    ModelDescriptor {
        id: "black-forest-labs/flux-canny-pro",
        display: "FLUX.1 Canny [pro]",
        kind: "edge-guided generation",
        notes: &[
            "Control structure/composition with edges; ideal for sketches/wireframes to detailed images.",
        ],
        accepts_image: true,
        inputs: &[
            ("image", req(FieldType::FileOrUrl)),
            ("prompt", req(FieldType::String)),
            ("seed", opt(FieldType::Integer)),
        ],
    },
];

/// Read-only handle over the model table.
///
/// The table is tiny, so lookup is a linear scan; listing preserves
/// declaration order.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    models: &'static [ModelDescriptor],
}

impl Catalog {
    /// Catalog over the built-in FLUX model table.
    pub fn builtin() -> Self {
        Self {
            models: FLUX_MODELS,
        }
    }

    /// Look up a model by its exact identifier.
    pub fn lookup(&self, model_id: &str) -> Option<&'static ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id)
    }

    /// All models, in declaration order.
    pub fn list_all(&self) -> &'static [ModelDescriptor] {
        self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_six_models() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.list_all().len(), 6);
    }

    #[test]
    fn default_model_is_listed() {
        let catalog = Catalog::builtin();
        let model = catalog.lookup(DEFAULT_MODEL).expect("default model");
        assert_eq!(model.display, "FLUX1.1 Pro Ultra");
        assert!(!model.accepts_image);
    }

    #[test]
    fn lookup_unknown_model_is_none() {
        let catalog = Catalog::builtin();
        assert!(catalog.lookup("black-forest-labs/flux-nonexistent").is_none());
        assert!(catalog.lookup("").is_none());
    }

    #[test]
    fn listing_preserves_declaration_order() {
        let catalog = Catalog::builtin();
        let ids: Vec<&str> = catalog.list_all().iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![
                "black-forest-labs/flux-1.1-pro-ultra",
                "black-forest-labs/flux-pro",
                "black-forest-labs/flux-redux-dev",
                "black-forest-labs/flux-fill-pro",
                "black-forest-labs/flux-depth-dev",
                "black-forest-labs/flux-canny-pro",
            ]
        );
    }

    #[test]
    fn every_model_requires_a_prompt() {
        for model in Catalog::builtin().list_all() {
            let (_, spec) = model
                .inputs
                .iter()
                .find(|(name, _)| *name == "prompt")
                .unwrap_or_else(|| panic!("{} has no prompt input", model.id));
            assert!(spec.required, "{} prompt must be required", model.id);
            assert_eq!(spec.ty, FieldType::String);
        }
    }

    #[test]
    fn image_models_declare_a_required_image_input() {
        for model in Catalog::builtin().list_all() {
            if model.accepts_image {
                let (_, spec) = model
                    .inputs
                    .iter()
                    .find(|(name, _)| *name == "image")
                    .unwrap_or_else(|| panic!("{} has no image input", model.id));
                assert!(spec.required, "{} image must be required", model.id);
                assert_eq!(spec.ty, FieldType::FileOrUrl);
            } else {
                assert!(!model.has_input("image"), "{} should not take images", model.id);
            }
        }
    }

    #[test]
    fn only_the_fill_model_declares_a_mask() {
        let with_mask: Vec<&str> = Catalog::builtin()
            .list_all()
            .iter()
            .filter(|m| m.has_input("mask"))
            .map(|m| m.id)
            .collect();
        assert_eq!(with_mask, vec!["black-forest-labs/flux-fill-pro"]);
    }

    #[test]
    fn has_input_matches_exact_names_only() {
        let catalog = Catalog::builtin();
        let ultra = catalog.lookup(DEFAULT_MODEL).unwrap();
        assert!(ultra.has_input("raw"));
        assert!(ultra.has_input("go_fast"));
        assert!(!ultra.has_input("strength"));
        assert!(!ultra.has_input("ra"));
        assert!(!ultra.has_input("rawr"));
    }

    #[test]
    fn input_names_follow_declaration_order() {
        let catalog = Catalog::builtin();
        let fill = catalog.lookup("black-forest-labs/flux-fill-pro").unwrap();
        assert_eq!(
            fill.input_names(),
            vec!["image", "mask", "prompt", "num_inference_steps", "guidance", "seed"]
        );
    }
}
