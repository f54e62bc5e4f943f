//! Ownership resolver.
//!
//! Collapses every narrator candidate into one canonical self entity, gives
//! each fact a resolvable owner, recomputes perspective from that owner, and
//! remaps every id reference through the same substitution table.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use notegraph_core::defaults::{SELF_ENTITY_ID, SYNTHESIZED_CONFIDENCE};
use notegraph_core::{Entity, EntityType, Extraction, Fact, Perspective, SourceText};

use crate::patterns::{
    is_first_person_name, COLLECTIVE_LEAD, DRIVING, EVIDENCE_LEAD, FIRST_PERSON, NARRATOR_CONTEXT,
    SINGULAR_SELF_DRIVING,
};

/// What the resolver did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipReport {
    /// No candidate existed; the self entity was built from a pronoun.
    pub self_synthesized: bool,
    /// Narrator candidates folded into the canonical entity.
    pub merged_candidates: usize,
    /// Duplicate entity ids removed.
    pub duplicate_entities: usize,
    /// Facts whose owner could not be resolved.
    pub dropped_facts: usize,
    /// Self-owned collective driving facts removed in favor of a third party.
    pub collective_conflicts: usize,
    /// Relations whose endpoints did not survive.
    pub dropped_relations: usize,
}

/// True when an entity stands for the note's author.
pub fn is_narrator_candidate(entity: &Entity) -> bool {
    entity.id == SELF_ENTITY_ID
        || is_first_person_name(&entity.name)
        || entity
            .context
            .as_deref()
            .map_or(false, |c| NARRATOR_CONTEXT.is_match(c))
}

/// Id substitution plus the set of ids that exist after resolution.
struct IdTable {
    substitutions: HashMap<String, String>,
    valid: HashSet<String>,
}

impl IdTable {
    /// Substituted id if it names a surviving entity.
    fn resolve(&self, id: Option<&str>) -> Option<String> {
        id.and_then(|id| self.resolve_id(id))
    }

    fn resolve_id(&self, id: &str) -> Option<String> {
        let mapped = self
            .substitutions
            .get(id)
            .map(String::as_str)
            .unwrap_or(id);
        self.valid.contains(mapped).then(|| mapped.to_string())
    }
}

/// Resolve fact ownership against the source text.
pub fn resolve_ownership(text: &str, mut extraction: Extraction) -> (Extraction, OwnershipReport) {
    let src = SourceText::new(text);
    let mut report = OwnershipReport::default();

    report.duplicate_entities = dedupe_entities(&mut extraction.entities);
    let substitutions = install_narrator(&src, &mut extraction.entities, &mut report);
    let ids = IdTable {
        substitutions,
        valid: extraction.entities.iter().map(|e| e.id.clone()).collect(),
    };
    let has_self = ids.valid.contains(SELF_ENTITY_ID);

    let mut facts = Vec::with_capacity(extraction.facts.len());
    for fact in std::mem::take(&mut extraction.facts) {
        match resolve_fact(&src, &ids, has_self, &extraction.entities, fact) {
            Some(fact) => facts.push(fact),
            None => report.dropped_facts += 1,
        }
    }

    let removed = remove_collective_driving(&src, &mut facts);
    report.collective_conflicts = removed;
    extraction.facts = facts;

    remap_references(&mut extraction, &ids, &mut report);

    debug!(
        self_synthesized = report.self_synthesized,
        merged = report.merged_candidates,
        dropped = report.dropped_facts,
        collective_conflicts = report.collective_conflicts,
        "Resolved fact ownership"
    );

    (extraction, report)
}

/// Keep the first entity for each id.
fn dedupe_entities(entities: &mut Vec<Entity>) -> usize {
    let before = entities.len();
    let mut seen = HashSet::new();
    entities.retain(|e| seen.insert(e.id.clone()));
    before - entities.len()
}

/// Replace all narrator candidates with one canonical entity, returning the
/// substitution table from candidate ids to the canonical id.
fn install_narrator(
    src: &SourceText<'_>,
    entities: &mut Vec<Entity>,
    report: &mut OwnershipReport,
) -> HashMap<String, String> {
    let pronoun = FIRST_PERSON.first_match(src.as_str()).and_then(|(_, m)| {
        let (start, end) = src.char_span(m.start(), m.end())?;
        Some((m.as_str().to_string(), start, end))
    });

    let insert_at = entities.iter().position(is_narrator_candidate);
    if insert_at.is_none() && pronoun.is_none() {
        return HashMap::new();
    }

    let mut candidates = Vec::new();
    entities.retain(|e| {
        if is_narrator_candidate(e) {
            candidates.push(e.clone());
            false
        } else {
            true
        }
    });

    let (name, name_start, name_end) = match (pronoun, candidates.first()) {
        (Some(found), _) => found,
        (None, Some(first)) => (first.name.clone(), first.name_start, first.name_end),
        (None, None) => return HashMap::new(),
    };

    let confidence = candidates
        .iter()
        .map(|c| c.confidence)
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
        .unwrap_or(SYNTHESIZED_CONFIDENCE);
    let evidence = candidates.iter().find_map(|c| c.evidence_span());

    let narrator = Entity {
        id: SELF_ENTITY_ID.to_string(),
        name,
        entity_type: EntityType::Person,
        name_start,
        name_end,
        evidence_start: evidence.map(|(s, _)| s),
        evidence_end: evidence.map(|(_, e)| e),
        context: candidates.iter().find_map(|c| c.context.clone()),
        confidence,
    };

    report.self_synthesized = candidates.is_empty();
    report.merged_candidates = candidates.len();
    if report.self_synthesized {
        debug!(name = %narrator.name, start = narrator.name_start, "Synthesized self entity from pronoun");
    }

    entities.insert(insert_at.unwrap_or(0).min(entities.len()), narrator);

    candidates
        .into_iter()
        .map(|c| (c.id, SELF_ENTITY_ID.to_string()))
        .collect()
}

/// Non-self entity whose name opens the evidence.
fn leading_entity<'e>(evidence: &str, entities: &'e [Entity]) -> Option<&'e Entity> {
    let head = evidence.trim_start_matches(|c: char| !c.is_alphanumeric());
    entities
        .iter()
        .filter(|e| e.id != SELF_ENTITY_ID && !e.name.is_empty())
        .find(|e| head.starts_with(e.name.as_str()))
}

fn resolve_fact(
    src: &SourceText<'_>,
    ids: &IdTable,
    has_self: bool,
    entities: &[Entity],
    mut fact: Fact,
) -> Option<Fact> {
    let evidence = src
        .slice(fact.evidence_start, fact.evidence_end)
        .unwrap_or("");
    let lead = EVIDENCE_LEAD.classify(evidence);
    let subject = ids.resolve(fact.subject_entity_id.as_deref());

    let forced_self =
        has_self && (fact.perspective == Perspective::SelfView || lead == Some(Perspective::SelfView));

    let owner = if forced_self {
        Some(SELF_ENTITY_ID.to_string())
    } else {
        ids.resolve_id(&fact.owner_entity_id)
            .or_else(|| subject.clone())
            .or_else(|| leading_entity(evidence, entities).map(|e| e.id.clone()))
    };

    let owner = match owner {
        Some(owner) => owner,
        None => {
            debug!(fact_id = %fact.id, owner = %fact.owner_entity_id, "No resolvable owner; dropping fact");
            return None;
        }
    };

    fact.perspective = if owner == SELF_ENTITY_ID {
        Perspective::SelfView
    } else if lead == Some(Perspective::Other)
        || subject.as_deref().map_or(false, |s| s != SELF_ENTITY_ID)
    {
        Perspective::Other
    } else {
        Perspective::Uncertain
    };

    trace!(fact_id = %fact.id, owner = %owner, perspective = %fact.perspective, "Resolved fact owner");

    fact.owner_entity_id = owner;
    fact.subject_entity_id = subject;
    fact.object_entity_id = ids.resolve(fact.object_entity_id.as_deref());
    Some(fact)
}

fn mentions_driving(src: &SourceText<'_>, fact: &Fact) -> bool {
    let evidence = src
        .slice(fact.evidence_start, fact.evidence_end)
        .unwrap_or("");
    DRIVING.is_match(evidence) || DRIVING.is_match(&fact.predicate)
}

/// Drop self-owned "we were driving" facts when a third party is explicitly
/// recorded as driving. Explicit singular self-driving phrases are kept.
fn remove_collective_driving(src: &SourceText<'_>, facts: &mut Vec<Fact>) -> usize {
    let evidence = |f: &Fact| src.slice(f.evidence_start, f.evidence_end).unwrap_or("");

    let third_party_driving = facts.iter().any(|f| {
        f.owner_entity_id != SELF_ENTITY_ID
            && mentions_driving(src, f)
            && !COLLECTIVE_LEAD.is_match(evidence(f))
    });
    if !third_party_driving {
        return 0;
    }

    let before = facts.len();
    facts.retain(|f| {
        let ev = evidence(f);
        let conflict = f.owner_entity_id == SELF_ENTITY_ID
            && mentions_driving(src, f)
            && COLLECTIVE_LEAD.is_match(ev)
            && !SINGULAR_SELF_DRIVING.is_match(ev);
        if conflict {
            debug!(fact_id = %f.id, "Removing collective driving fact attributed to a third party");
        }
        !conflict
    });
    before - facts.len()
}

/// Remap relations, groups, segments, and todo assignees, then filter to
/// surviving ids.
fn remap_references(extraction: &mut Extraction, ids: &IdTable, report: &mut OwnershipReport) {
    let mut index_map = Vec::with_capacity(extraction.relations.len());
    let mut relations = Vec::with_capacity(extraction.relations.len());
    for mut relation in std::mem::take(&mut extraction.relations) {
        match (
            ids.resolve_id(&relation.from_entity_id),
            ids.resolve_id(&relation.to_entity_id),
        ) {
            (Some(from), Some(to)) => {
                relation.from_entity_id = from;
                relation.to_entity_id = to;
                index_map.push(Some(relations.len()));
                relations.push(relation);
            }
            _ => {
                index_map.push(None);
                report.dropped_relations += 1;
            }
        }
    }
    extraction.relations = relations;

    let fact_ids: HashSet<String> = extraction.facts.iter().map(|f| f.id.clone()).collect();

    for group in &mut extraction.groups {
        group.entity_ids = remap_ids(&group.entity_ids, ids);
        group.fact_ids.retain(|id| fact_ids.contains(id));
    }
    for segment in &mut extraction.segments {
        segment.entity_ids = remap_ids(&segment.entity_ids, ids);
        segment.fact_ids.retain(|id| fact_ids.contains(id));
        segment.relation_indexes = segment
            .relation_indexes
            .iter()
            .filter_map(|&i| index_map.get(i).copied().flatten())
            .collect();
    }
    for todo in &mut extraction.todos {
        todo.assignee_entity_id = ids.resolve(todo.assignee_entity_id.as_deref());
    }
}

/// Substitute, drop unknown, and dedupe while keeping order.
fn remap_ids(list: &[String], ids: &IdTable) -> Vec<String> {
    let mut seen = HashSet::new();
    list.iter()
        .filter_map(|id| ids.resolve_id(id))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{Group, Relation, Sentiment, Todo};

    fn entity(id: &str, name: &str, start: usize, end: usize) -> Entity {
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            entity_type: EntityType::Person,
            name_start: start,
            name_end: end,
            evidence_start: None,
            evidence_end: None,
            context: None,
            confidence: 0.9,
        }
    }

    fn fact(id: &str, owner: &str, perspective: Perspective, start: usize, end: usize) -> Fact {
        Fact {
            id: id.to_string(),
            owner_entity_id: owner.to_string(),
            perspective,
            subject_entity_id: None,
            predicate: "did".to_string(),
            object_entity_id: None,
            object_text: None,
            evidence_start: start,
            evidence_end: end,
            confidence: 0.8,
            segment_id: None,
        }
    }

    fn extraction(entities: Vec<Entity>, facts: Vec<Fact>) -> Extraction {
        Extraction {
            title: "t".to_string(),
            note_type: "journal".to_string(),
            summary: "s".to_string(),
            language: "en".to_string(),
            date: None,
            sentiment: Sentiment::Neutral,
            emotions: vec![],
            entities,
            facts,
            relations: vec![],
            todos: vec![],
            groups: vec![],
            segments: vec![],
        }
    }

    const CALL: &str = "I called support. Egle was driving.";

    #[test]
    fn test_self_and_other_ownership() {
        let ex = extraction(
            vec![entity("e_egle", "Egle", 18, 22)],
            vec![
                fact("f1", "p1", Perspective::Uncertain, 0, 17),
                fact("f2", "p2", Perspective::Uncertain, 18, 35),
            ],
        );
        let (ex, report) = resolve_ownership(CALL, ex);

        assert!(report.self_synthesized);
        let me = ex.entity(SELF_ENTITY_ID).unwrap();
        assert_eq!((me.name.as_str(), me.name_start, me.name_end), ("I", 0, 1));

        let f1 = ex.fact("f1").unwrap();
        assert_eq!(f1.owner_entity_id, SELF_ENTITY_ID);
        assert_eq!(f1.perspective, Perspective::SelfView);

        let f2 = ex.fact("f2").unwrap();
        assert_eq!(f2.owner_entity_id, "e_egle");
        assert_eq!(f2.perspective, Perspective::Other);
    }

    #[test]
    fn test_candidates_merge_into_one_narrator() {
        let text = "Me and my dog. I walked.";
        let mut noted = entity("n1", "dog", 10, 13);
        noted.context = Some("the notetaker".to_string());
        let ex = extraction(
            vec![
                entity("e_me", "Me", 0, 2),
                noted,
                entity("self", "I", 15, 16),
            ],
            vec![fact("f1", "e_me", Perspective::Uncertain, 15, 24)],
        );
        let (ex, report) = resolve_ownership(text, ex);

        assert_eq!(report.merged_candidates, 3);
        assert!(!report.self_synthesized);
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities.iter().filter(|e| is_narrator_candidate(e)).count(), 1);
        // Re-pointed to the first singular pronoun.
        assert_eq!(ex.entities[0].name, "Me");
        assert_eq!(ex.fact("f1").unwrap().owner_entity_id, SELF_ENTITY_ID);
    }

    #[test]
    fn test_plural_pronoun_used_when_no_singular() {
        let text = "We went to Vilnius.";
        let ex = extraction(vec![], vec![fact("f1", "x", Perspective::Uncertain, 0, 19)]);
        let (ex, _) = resolve_ownership(text, ex);
        let me = ex.entity(SELF_ENTITY_ID).unwrap();
        assert_eq!(me.name, "We");
        assert_eq!(me.confidence, SYNTHESIZED_CONFIDENCE);
        assert_eq!(ex.facts[0].owner_entity_id, SELF_ENTITY_ID);
    }

    #[test]
    fn test_no_first_person_means_no_self() {
        let text = "Egle was driving.";
        let ex = extraction(
            vec![entity("e1", "Egle", 0, 4)],
            vec![fact("f1", "ghost", Perspective::SelfView, 0, 17)],
        );
        let (ex, report) = resolve_ownership(text, ex);
        assert!(ex.entity(SELF_ENTITY_ID).is_none());
        // Falls through to the leading-name rule.
        assert_eq!(ex.facts[0].owner_entity_id, "e1");
        assert_eq!(report.dropped_facts, 0);
    }

    #[test]
    fn test_unresolvable_fact_dropped() {
        let text = "The weather was cold.";
        let ex = extraction(vec![], vec![fact("f1", "ghost", Perspective::Other, 0, 21)]);
        let (ex, report) = resolve_ownership(text, ex);
        assert!(ex.facts.is_empty());
        assert_eq!(report.dropped_facts, 1);
    }

    #[test]
    fn test_subject_fallback() {
        let text = "The weather in Kaunas was cold.";
        let mut f = fact("f1", "ghost", Perspective::Uncertain, 0, 31);
        f.subject_entity_id = Some("e_city".to_string());
        let ex = extraction(vec![entity("e_city", "Kaunas", 15, 21)], vec![f]);
        let (ex, _) = resolve_ownership(text, ex);
        assert_eq!(ex.facts[0].owner_entity_id, "e_city");
        assert_eq!(ex.facts[0].perspective, Perspective::Other);
    }

    #[test]
    fn test_uncertain_when_no_cues() {
        let text = "The weather in Kaunas was cold.";
        let ex = extraction(
            vec![entity("e_city", "Kaunas", 15, 21)],
            vec![fact("f1", "e_city", Perspective::Other, 0, 31)],
        );
        let (ex, _) = resolve_ownership(text, ex);
        assert_eq!(ex.facts[0].perspective, Perspective::Uncertain);
    }

    #[test]
    fn test_dedupe_entities_first_wins() {
        let text = "Egle and Egle.";
        let ex = extraction(
            vec![entity("e1", "Egle", 0, 4), entity("e1", "Egle", 9, 13)],
            vec![],
        );
        let (ex, report) = resolve_ownership(text, ex);
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities[0].name_start, 0);
        assert_eq!(report.duplicate_entities, 1);
    }

    #[test]
    fn test_references_remapped_and_filtered() {
        let mut ex = extraction(
            vec![entity("e_i", "I", 0, 1), entity("e_egle", "Egle", 18, 22)],
            vec![
                fact("f1", "e_i", Perspective::SelfView, 0, 17),
                fact("f2", "nobody", Perspective::Uncertain, 5, 11),
            ],
        );
        ex.relations = vec![
            Relation {
                from_entity_id: "e_i".to_string(),
                to_entity_id: "e_egle".to_string(),
                relation_type: "friend".to_string(),
                evidence_start: None,
                evidence_end: None,
                confidence: 0.7,
            },
            Relation {
                from_entity_id: "ghost".to_string(),
                to_entity_id: "e_egle".to_string(),
                relation_type: "knows".to_string(),
                evidence_start: None,
                evidence_end: None,
                confidence: 0.7,
            },
        ];
        ex.groups = vec![Group {
            name: "people".to_string(),
            entity_ids: vec!["e_i".to_string(), "self".to_string(), "ghost".to_string()],
            fact_ids: vec!["f1".to_string(), "f2".to_string()],
        }];
        ex.todos = vec![Todo {
            id: "t1".to_string(),
            description: "call".to_string(),
            assignee_entity_id: Some("e_i".to_string()),
            evidence_start: 2,
            evidence_end: 8,
            confidence: 0.6,
        }];

        let (ex, report) = resolve_ownership(CALL, ex);
        assert_eq!(ex.relations.len(), 1);
        assert_eq!(ex.relations[0].from_entity_id, SELF_ENTITY_ID);
        assert_eq!(report.dropped_relations, 1);
        assert_eq!(ex.groups[0].entity_ids, vec![SELF_ENTITY_ID.to_string()]);
        // "called" carries no pronoun and has no valid owner.
        assert_eq!(ex.groups[0].fact_ids, vec!["f1".to_string()]);
        assert_eq!(ex.todos[0].assignee_entity_id.as_deref(), Some(SELF_ENTITY_ID));
    }

    #[test]
    fn test_collective_driving_conflict_removed() {
        let text = "We were driving home. Egle was driving.";
        let ex = extraction(
            vec![entity("e_egle", "Egle", 22, 26)],
            vec![
                fact("f_we", "self", Perspective::SelfView, 0, 21),
                fact("f_egle", "e_egle", Perspective::Other, 22, 39),
            ],
        );
        let (ex, report) = resolve_ownership(text, ex);
        assert_eq!(report.collective_conflicts, 1);
        assert!(ex.fact("f_we").is_none());
        assert!(ex.fact("f_egle").is_some());
    }

    #[test]
    fn test_singular_self_driving_preserved() {
        let text = "I was driving first. Egle was driving later.";
        let ex = extraction(
            vec![entity("e_egle", "Egle", 21, 25)],
            vec![
                fact("f_me", "self", Perspective::SelfView, 0, 20),
                fact("f_egle", "e_egle", Perspective::Other, 21, 44),
            ],
        );
        let (ex, report) = resolve_ownership(text, ex);
        assert_eq!(report.collective_conflicts, 0);
        assert_eq!(ex.facts.len(), 2);
    }

    #[test]
    fn test_collective_driving_kept_without_third_party() {
        let text = "We were driving home.";
        let ex = extraction(vec![], vec![fact("f_we", "self", Perspective::SelfView, 0, 21)]);
        let (ex, _) = resolve_ownership(text, ex);
        assert_eq!(ex.facts.len(), 1);
    }

    #[test]
    fn test_resolution_is_stable() {
        let ex = extraction(
            vec![entity("e_egle", "Egle", 18, 22)],
            vec![
                fact("f1", "p1", Perspective::Uncertain, 0, 17),
                fact("f2", "p2", Perspective::Uncertain, 18, 35),
            ],
        );
        let (once, _) = resolve_ownership(CALL, ex);
        let (twice, report) = resolve_ownership(CALL, once.clone());
        assert_eq!(once, twice);
        assert_eq!(report.dropped_facts, 0);
    }
}
