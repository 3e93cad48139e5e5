use std::sync::Arc;

use crate::container::container::Container;
use crate::container::descriptor::{Capability, ObjectDescriptor, ObjectRef};
use crate::container::scope::ObjectScope;
use crate::errors::ContainerError;

/// How many providers a request expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A capability lookup against the container's candidates.
///
/// Defaults: required, no name hint, no requester, non-singleton candidates
/// included, eager initialization of type-unknown candidates allowed.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    capability: Capability,
    cardinality: Cardinality,
    required: bool,
    name_hint: Option<String>,
    requester: Option<String>,
    include_non_singletons: bool,
    allow_eager_init: bool,
}

impl CapabilityRequest {
    pub fn for_capability(capability: Capability, cardinality: Cardinality) -> Self {
        Self {
            capability,
            cardinality,
            required: true,
            name_hint: None,
            requester: None,
            include_non_singletons: true,
            allow_eager_init: true,
        }
    }

    /// Request exactly one provider of `T`
    pub fn one<T: 'static + ?Sized>() -> Self {
        Self::for_capability(Capability::of::<T>(), Cardinality::One)
    }

    /// Request every provider of `T`
    pub fn many<T: 'static + ?Sized>() -> Self {
        Self::for_capability(Capability::of::<T>(), Cardinality::Many)
    }

    /// A missing provider yields an empty resolution instead of an error
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Name used as a last-resort tie-break among equivalent candidates
    pub fn with_name_hint(mut self, hint: impl Into<String>) -> Self {
        self.name_hint = Some(hint.into());
        self
    }

    /// Name of the object this request is resolved on behalf of; excluded
    /// from the candidate set except as a final fallback.
    pub fn requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    /// Only consider singleton-scoped definitions
    pub fn singletons_only(mut self) -> Self {
        self.include_non_singletons = false;
        self
    }

    /// Never instantiate a definition just to learn its type
    pub fn no_eager_init(mut self) -> Self {
        self.allow_eager_init = false;
        self
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn requester(&self) -> Option<&str> {
        self.requester.as_deref()
    }
}

/// Outcome of a capability request
pub enum Resolution {
    /// No provider; only produced by optional single-result requests
    None,
    One { name: String, instance: ObjectRef },
    /// All providers in declared order; may be empty
    Many(Vec<(String, ObjectRef)>),
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::One { name, .. } => f.debug_struct("One").field("name", name).finish(),
            Self::Many(entries) => {
                let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
                f.debug_tuple("Many").field(&names).finish()
            }
        }
    }
}

enum CandidateValue {
    Instance(ObjectRef),
    /// Matched by declared type; instantiated only if it wins
    Unresolved,
}

struct Candidate {
    name: String,
    descriptor: Option<Arc<ObjectDescriptor>>,
    value: CandidateValue,
}

/// Resolves capability requests against a container's definitions and
/// manually registered instances.
///
/// Matching is declaration-driven: a definition matches through its declared
/// capabilities or implementation key, never by instantiating it. The one
/// exception is a definition with no declared type at all, which is
/// instantiated to learn its concrete type when the request allows eager
/// initialization.
/// With a single-result request, losing candidates are never instantiated.
pub struct CandidateResolver<'a> {
    container: &'a Container,
}

impl<'a> CandidateResolver<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub fn resolve(&self, request: &CapabilityRequest) -> Result<Resolution, ContainerError> {
        let requester = request
            .requester
            .as_deref()
            .map(|r| self.container.store().canonical_name(r));

        let mut candidates = self.collect(request, requester.as_deref(), false)?;
        if candidates.is_empty() && requester.is_some() && request.cardinality == Cardinality::One
        {
            // Final pass: an object may satisfy its own single-result request
            candidates = self.collect(request, requester.as_deref(), true)?;
        }

        match request.cardinality {
            Cardinality::Many => self.resolve_many(candidates),
            Cardinality::One => self.resolve_one(request, candidates),
        }
    }

    /// Enumerate matching candidates in registration order. `self_pass`
    /// restricts the scan to the requester itself.
    fn collect(
        &self,
        request: &CapabilityRequest,
        requester: Option<&str>,
        self_pass: bool,
    ) -> Result<Vec<Candidate>, ContainerError> {
        let mut names = self.container.store().names();
        // Manual instances follow in their own registration order
        for name in self.container.singletons().names() {
            if self.container.manual_capabilities(&name).is_some()
                && !names.iter().any(|n| n == &name)
            {
                names.push(name);
            }
        }

        let mut candidates = Vec::new();
        for name in names {
            let is_self = requester == Some(name.as_str());
            if self_pass != is_self {
                continue;
            }
            if let Some(candidate) = self.examine(request, &name)? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    fn examine(
        &self,
        request: &CapabilityRequest,
        name: &str,
    ) -> Result<Option<Candidate>, ContainerError> {
        // Manually registered instances match through their declared
        // capability list. An entry whose instance has since been destroyed
        // is simply no longer a candidate.
        if let Some(capabilities) = self.container.manual_capabilities(name) {
            if capabilities.iter().any(|c| c == &request.capability) {
                let Some(instance) = self.container.singletons().get(name, false) else {
                    return Ok(None);
                };
                return Ok(Some(Candidate {
                    name: name.to_string(),
                    descriptor: None,
                    value: CandidateValue::Instance(instance),
                }));
            }
            return Ok(None);
        }

        let Some(descriptor) = self.container.store().merged(name)? else {
            return Ok(None);
        };
        if descriptor.is_abstract() || !descriptor.is_eligible() {
            return Ok(None);
        }
        if !request.include_non_singletons && descriptor.scope() != ObjectScope::Singleton {
            return Ok(None);
        }

        if descriptor.has_known_type() {
            if !descriptor.provides_capability(&request.capability) {
                return Ok(None);
            }
            // Type-known matches stay unresolved until they win, so a
            // losing candidate is never instantiated.
            return Ok(Some(Candidate {
                name: name.to_string(),
                descriptor: Some(descriptor),
                value: CandidateValue::Unresolved,
            }));
        }

        // No declared type: only an instance can tell whether it matches
        if !request.allow_eager_init || !request.capability.params().is_empty() {
            return Ok(None);
        }
        let instance = match self.container.get_object(name) {
            Ok(instance) => instance,
            Err(err) => {
                tracing::debug!(
                    "Skipping candidate '{}' for '{}': instantiation failed: {}",
                    name,
                    request.capability.describe(),
                    err
                );
                self.container.singletons().on_suppressed(err);
                return Ok(None);
            }
        };
        if instance.as_ref().type_id() == request.capability.key().id() {
            Ok(Some(Candidate {
                name: name.to_string(),
                descriptor: Some(descriptor),
                value: CandidateValue::Instance(instance),
            }))
        } else {
            Ok(None)
        }
    }

    fn resolve_many(&self, mut candidates: Vec<Candidate>) -> Result<Resolution, ContainerError> {
        // Stable sort: unordered candidates keep registration order at the end
        candidates.sort_by_key(|c| {
            c.descriptor
                .as_ref()
                .and_then(|d| d.order())
                .unwrap_or(i32::MAX)
        });
        let mut entries = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let instance = self.materialize(&candidate)?;
            entries.push((candidate.name, instance));
        }
        Ok(Resolution::Many(entries))
    }

    fn resolve_one(
        &self,
        request: &CapabilityRequest,
        candidates: Vec<Candidate>,
    ) -> Result<Resolution, ContainerError> {
        if candidates.is_empty() {
            if request.required {
                return Err(ContainerError::NoMatchingCandidate {
                    capability: request.capability.describe(),
                });
            }
            return Ok(Resolution::None);
        }
        let winner = if candidates.len() > 1 {
            match self.determine_winner(request, candidates)? {
                Some(winner) => winner,
                None => return Ok(Resolution::None),
            }
        } else {
            match candidates.into_iter().next() {
                Some(only) => only,
                None => return Ok(Resolution::None),
            }
        };
        let instance = self.materialize(&winner)?;
        Ok(Resolution::One {
            name: winner.name,
            instance,
        })
    }

    /// Tie-break among multiple matching candidates: explicit primary flag,
    /// then declared priority (lower wins), then the request's name hint.
    fn determine_winner(
        &self,
        request: &CapabilityRequest,
        mut candidates: Vec<Candidate>,
    ) -> Result<Option<Candidate>, ContainerError> {
        let primaries: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.descriptor
                    .as_ref()
                    .map(|d| d.is_primary())
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();
        match primaries.len() {
            1 => return Ok(Some(candidates.swap_remove(primaries[0]))),
            n if n > 1 => {
                return Err(self.ambiguity(request, &candidates));
            }
            _ => {}
        }

        if let Some(best) = candidates
            .iter()
            .filter_map(|c| c.descriptor.as_ref().and_then(|d| d.priority()))
            .min()
        {
            let holders: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.descriptor.as_ref().and_then(|d| d.priority()) == Some(best)
                })
                .map(|(i, _)| i)
                .collect();
            if holders.len() == 1 {
                return Ok(Some(candidates.swap_remove(holders[0])));
            }
            return Err(self.ambiguity(request, &candidates));
        }

        if let Some(hint) = request.name_hint.as_deref() {
            let canonical_hint = self.container.store().canonical_name(hint);
            if let Some(pos) = candidates.iter().position(|c| c.name == canonical_hint) {
                return Ok(Some(candidates.swap_remove(pos)));
            }
        }

        if request.required {
            Err(self.ambiguity(request, &candidates))
        } else {
            Ok(None)
        }
    }

    fn ambiguity(&self, request: &CapabilityRequest, candidates: &[Candidate]) -> ContainerError {
        ContainerError::Ambiguous {
            capability: request.capability.describe(),
            candidates: candidates.iter().map(|c| c.name.clone()).collect(),
        }
    }

    fn materialize(&self, candidate: &Candidate) -> Result<ObjectRef, ContainerError> {
        let instance = match &candidate.value {
            CandidateValue::Instance(instance) => instance.clone(),
            CandidateValue::Unresolved => self.container.get_object(&candidate.name)?,
        };
        // The declaration promised the capability; verify the instance's
        // concrete type backs it up where that is checkable.
        if let Some(descriptor) = &candidate.descriptor {
            if let Some(impl_key) = descriptor.implementation() {
                let tid = instance.as_ref().type_id();
                if tid != impl_key.id() {
                    return Err(ContainerError::TypeMismatch {
                        name: candidate.name.clone(),
                        expected: impl_key.name().to_string(),
                        actual: "a different runtime type".to_string(),
                    });
                }
            }
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::ObjectDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Codec: Send + Sync {
        fn format(&self) -> &'static str;
    }

    struct JsonCodec;
    impl Codec for JsonCodec {
        fn format(&self) -> &'static str {
            "json"
        }
    }

    struct MsgpackCodec;
    impl Codec for MsgpackCodec {
        fn format(&self) -> &'static str {
            "msgpack"
        }
    }

    fn codec_container() -> Container {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();
        container
            .register(
                ObjectDescriptor::named("msgpack")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(MsgpackCodec))
                    .build(),
            )
            .unwrap();
        container
    }

    #[test]
    fn single_candidate_resolves_directly() {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap()
        {
            Resolution::One { name, instance } => {
                assert_eq!(name, "json");
                assert!(instance.downcast::<JsonCodec>().is_ok());
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn two_equivalent_candidates_are_ambiguous() {
        let container = codec_container();
        let err = container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap_err();
        match err {
            ContainerError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates, vec!["json", "msgpack"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn primary_flag_breaks_the_tie() {
        let container = codec_container();
        container
            .register(
                ObjectDescriptor::named("msgpack")
                    .provides::<dyn Codec>()
                    .primary(true)
                    .with_factory(|_| Ok(MsgpackCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "msgpack"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn two_primaries_are_ambiguous() {
        let container = Container::new();
        for name in ["json", "msgpack"] {
            container
                .register(
                    ObjectDescriptor::named(name)
                        .provides::<dyn Codec>()
                        .primary(true)
                        .with_factory(|_| Ok(JsonCodec))
                        .build(),
                )
                .unwrap();
        }
        let err = container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap_err();
        assert!(err.is_ambiguous());
    }

    #[test]
    fn lower_priority_value_wins() {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .priority(10)
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();
        container
            .register(
                ObjectDescriptor::named("msgpack")
                    .provides::<dyn Codec>()
                    .priority(1)
                    .with_factory(|_| Ok(MsgpackCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "msgpack"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn equal_priorities_are_ambiguous() {
        let container = Container::new();
        for name in ["json", "msgpack"] {
            container
                .register(
                    ObjectDescriptor::named(name)
                        .provides::<dyn Codec>()
                        .priority(5)
                        .with_factory(|_| Ok(JsonCodec))
                        .build(),
                )
                .unwrap();
        }
        let err = container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap_err();
        assert!(err.is_ambiguous());
    }

    #[test]
    fn name_hint_breaks_remaining_ties_including_aliases() {
        let container = codec_container();
        container.register_alias("msgpack", "compact").unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>().with_name_hint("compact"))
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "msgpack"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn optional_unresolvable_requests_yield_none() {
        let container = codec_container();
        // Ambiguous and optional: no winner, no error
        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>().optional())
            .unwrap()
        {
            Resolution::None => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
        // No candidate at all and optional
        match container
            .resolve(&CapabilityRequest::one::<String>().optional())
            .unwrap()
        {
            Resolution::None => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
        // No candidate and required
        let err = container
            .resolve(&CapabilityRequest::one::<String>())
            .unwrap_err();
        assert!(matches!(err, ContainerError::NoMatchingCandidate { .. }));
    }

    #[test]
    fn many_returns_all_in_declared_order() {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("late")
                    .provides::<dyn Codec>()
                    .order(20)
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();
        container
            .register(
                ObjectDescriptor::named("early")
                    .provides::<dyn Codec>()
                    .order(1)
                    .with_factory(|_| Ok(MsgpackCodec))
                    .build(),
            )
            .unwrap();
        container
            .register(
                ObjectDescriptor::named("unordered")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::many::<dyn Codec>())
            .unwrap()
        {
            Resolution::Many(entries) => {
                let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["early", "late", "unordered"]);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn many_with_no_candidates_is_an_empty_collection() {
        let container = Container::new();
        match container
            .resolve(&CapabilityRequest::many::<dyn Codec>())
            .unwrap()
        {
            Resolution::Many(entries) => assert!(entries.is_empty()),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn losing_candidates_are_never_instantiated() {
        static JSON_BUILT: AtomicUsize = AtomicUsize::new(0);
        static MSGPACK_BUILT: AtomicUsize = AtomicUsize::new(0);

        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .with_factory(|_| {
                        JSON_BUILT.fetch_add(1, Ordering::SeqCst);
                        Ok(JsonCodec)
                    })
                    .build(),
            )
            .unwrap();
        container
            .register(
                ObjectDescriptor::named("msgpack")
                    .provides::<dyn Codec>()
                    .primary(true)
                    .with_factory(|_| {
                        MSGPACK_BUILT.fetch_add(1, Ordering::SeqCst);
                        Ok(MsgpackCodec)
                    })
                    .build(),
            )
            .unwrap();

        container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap();
        assert_eq!(MSGPACK_BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(JSON_BUILT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ineligible_candidates_are_skipped() {
        let container = codec_container();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .not_eligible()
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "msgpack"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn non_singletons_can_be_excluded() {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("per-call")
                    .provides::<dyn Codec>()
                    .scope(ObjectScope::Prototype)
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>().optional().singletons_only())
            .unwrap()
        {
            Resolution::None => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn type_unknown_definitions_match_only_with_eager_init() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("opaque")
                    .with_raw_factory(|_| {
                        BUILT.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(JsonCodec) as ObjectRef)
                    })
                    .build(),
            )
            .unwrap();

        // Without eager init the candidate is invisible
        match container
            .resolve(&CapabilityRequest::one::<JsonCodec>().optional().no_eager_init())
            .unwrap()
        {
            Resolution::None => {}
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 0);

        // With eager init it is instantiated and matched by concrete type
        match container
            .resolve(&CapabilityRequest::one::<JsonCodec>())
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "opaque"),
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_instances_participate_via_declared_capabilities() {
        let container = Container::new();
        container
            .register_instance_with(
                "handwired",
                JsonCodec,
                vec![Capability::of::<dyn Codec>()],
            )
            .unwrap();

        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>())
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "handwired"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_excluded_then_allowed_as_fallback() {
        let container = Container::new();
        container
            .register(
                ObjectDescriptor::named("json")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(JsonCodec))
                    .build(),
            )
            .unwrap();

        // Another candidate exists: the requester never sees itself
        container
            .register(
                ObjectDescriptor::named("msgpack")
                    .provides::<dyn Codec>()
                    .with_factory(|_| Ok(MsgpackCodec))
                    .build(),
            )
            .unwrap();
        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>().requested_by("json"))
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "msgpack"),
            other => panic!("unexpected resolution: {other:?}"),
        }

        // Requester is the only provider: the final pass admits it
        container.remove_definition("msgpack").unwrap();
        match container
            .resolve(&CapabilityRequest::one::<dyn Codec>().requested_by("json"))
            .unwrap()
        {
            Resolution::One { name, .. } => assert_eq!(name, "json"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn resolution_records_dependency_edges_for_the_requester() {
        let container = codec_container();
        container
            .resolve(
                &CapabilityRequest::many::<dyn Codec>().requested_by("consumer"),
            )
            .unwrap();
        let mut deps = container.dependencies_of("consumer");
        deps.sort();
        assert_eq!(deps, vec!["json", "msgpack"]);
    }
}
