mod content_validator;
mod model;
mod registry;

pub use content_validator::{
    BuiltinValidator, ContentValidator, SectionContent, ValidatorRef, ValidatorSet,
};
pub use model::{
    Cardinality, ClassDefinition, ClassSchema, IdentifierDefinition, IdentifierLocation,
    IdentifierSpec, ModuleDefinition, ModuleSchema, ReferenceDefinition, ReferenceRule,
    SectionDefinition, SectionRule, UniquenessScope,
};
pub use registry::{TypeMatch, TypeRegistry, default_definitions};
