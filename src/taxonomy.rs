//! Default subject taxonomy used to seed fresh documents.
//!
//! Node ids are stable join keys: competency ids appear in
//! `Student.assessments` and must never be reused for new nodes.

use crate::model::{Category, Competency, Subject};

fn comp(id: &str, text: &str) -> Competency {
    Competency {
        id: id.to_string(),
        text: text.to_string(),
    }
}

fn cat(id: &str, name: &str, competencies: Vec<Competency>) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        competencies,
    }
}

fn subj(id: &str, name: &str, categories: Vec<Category>) -> Subject {
    Subject {
        id: id.to_string(),
        name: name.to_string(),
        categories,
    }
}

pub fn default_subjects() -> Vec<Subject> {
    vec![
        subj(
            "subj-de",
            "Deutsch",
            vec![
                cat(
                    "cat-de-1",
                    "Sprechen und Zuhören",
                    vec![
                        comp("comp-de-1-1", "nutzt einen angemessenen Wortschatz"),
                        comp("comp-de-1-2", "erzählt und informiert ziel- und zweckorientiert"),
                        comp("comp-de-1-3", "beachtet Gesprächsregeln"),
                        comp("comp-de-1-4", "nutzt Strategien des verstehenden Zuhörens"),
                    ],
                ),
                cat(
                    "cat-de-2",
                    "Schreiben",
                    vec![
                        comp("comp-de-2-1", "schreibt lesbar"),
                        comp("comp-de-2-2", "nutzt Rechtschreibstrategien und -hilfen"),
                        comp(
                            "comp-de-2-3",
                            "schreibt und überarbeitet Texte in unterschiedlichen Textformen",
                        ),
                    ],
                ),
                cat(
                    "cat-de-3",
                    "Lesen",
                    vec![
                        comp("comp-de-3-1", "liest"),
                        comp("comp-de-3-2", "trägt Texte gestaltend vor"),
                        comp("comp-de-3-3", "nutzt Lesestrategien"),
                    ],
                ),
            ],
        ),
        subj(
            "subj-ma",
            "Mathematik",
            vec![
                cat(
                    "cat-ma-1",
                    "Zahlen und Operationen",
                    vec![
                        comp(
                            "comp-ma-1-1",
                            "unterscheidet Zahlen und stellt sie verschieden dar",
                        ),
                        comp(
                            "comp-ma-1-2",
                            "addiert im Zahlenraum mit verschiedenen Strategien",
                        ),
                        comp(
                            "comp-ma-1-3",
                            "subtrahiert im Zahlenraum mit verschiedenen Strategien",
                        ),
                    ],
                ),
                cat(
                    "cat-ma-2",
                    "Raum und Form",
                    vec![
                        comp("comp-ma-2-1", "orientiert sich im Raum"),
                        comp(
                            "comp-ma-2-2",
                            "erkennt und beschreibt geometrische Figuren",
                        ),
                    ],
                ),
            ],
        ),
        subj(
            "subj-su",
            "Sachunterricht",
            vec![cat(
                "cat-su-1",
                "Erkennen und Verstehen",
                vec![
                    comp("comp-su-1-1", "beobachtet und beschreibt Naturphänomene"),
                    comp("comp-su-1-2", "stellt Fragen und formuliert Vermutungen"),
                ],
            )],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn node_ids_are_unique_across_the_whole_taxonomy() {
        let mut seen = HashSet::new();
        for subject in default_subjects() {
            assert!(seen.insert(subject.id.clone()), "duplicate id {}", subject.id);
            for category in subject.categories {
                assert!(seen.insert(category.id.clone()), "duplicate id {}", category.id);
                for competency in category.competencies {
                    assert!(
                        seen.insert(competency.id.clone()),
                        "duplicate id {}",
                        competency.id
                    );
                }
            }
        }
    }

    #[test]
    fn every_node_has_display_text() {
        for subject in default_subjects() {
            assert!(!subject.name.is_empty());
            for category in subject.categories {
                assert!(!category.name.is_empty());
                for competency in category.competencies {
                    assert!(!competency.text.is_empty());
                }
            }
        }
    }
}
