// SPDX-License-Identifier: Apache-2.0

//! Structural validation of a parsed pipeline graph.

use crate::error::Error;
use crate::{LinkType, NodeKind, NodeSpec, PipelineSpec};
use std::collections::{BTreeMap, HashMap};

pub(crate) fn validate<F>(
    spec: &PipelineSpec,
    resolve: F,
) -> Result<BTreeMap<String, NodeKind>, Error>
where
    F: Fn(&NodeSpec) -> Option<NodeKind>,
{
    let mut kinds = BTreeMap::new();
    for (name, node) in &spec.nodes {
        let kind = resolve(node).ok_or_else(|| Error::UnknownStageType {
            node: name.clone(),
            type_tag: node.type_tag.clone(),
        })?;
        let _ = kinds.insert(name.clone(), kind);
    }

    for edge in &spec.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !spec.nodes.contains_key(endpoint) {
                return Err(Error::UndeclaredNode {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        if edge.from == edge.to {
            return Err(Error::SelfLoop {
                node: edge.from.clone(),
            });
        }
        check_edge_kinds(edge.link_type, &edge.from, kinds[&edge.from], &edge.to, kinds[&edge.to])?;
    }

    check_degrees(spec, &kinds)?;
    check_acyclic(spec, LinkType::Normal).map_err(|node| Error::NormalCycle { node })?;
    check_acyclic(spec, LinkType::Overflow).map_err(|node| Error::OverflowCycle { node })?;

    Ok(kinds)
}

fn check_edge_kinds(
    link_type: LinkType,
    from: &str,
    from_kind: NodeKind,
    to: &str,
    to_kind: NodeKind,
) -> Result<(), Error> {
    let reason = match link_type {
        LinkType::Overflow => {
            if from_kind == NodeKind::Sink && to_kind == NodeKind::Sink {
                return Ok(());
            }
            "overflow edges must connect a sink to a sink"
        }
        LinkType::Normal => match (from_kind, to_kind) {
            (NodeKind::Source | NodeKind::Transform, NodeKind::Transform | NodeKind::Sink) => {
                return Ok(());
            }
            (NodeKind::Sink, _) => "sinks have no normal out-edges",
            (_, NodeKind::Source) => "sources accept no in-edges",
        },
    };
    Err(Error::IncompatibleEdge {
        from: from.to_owned(),
        from_kind,
        to: to.to_owned(),
        to_kind,
        reason: reason.to_owned(),
    })
}

fn check_degrees(
    spec: &PipelineSpec,
    kinds: &BTreeMap<String, NodeKind>,
) -> Result<(), Error> {
    for (name, kind) in kinds {
        match kind {
            NodeKind::Transform => {
                let has_in = spec.edges.iter().any(|e| &e.to == name);
                let has_out = spec
                    .edges
                    .iter()
                    .any(|e| &e.from == name && e.link_type == LinkType::Normal);
                if !has_in || !has_out {
                    return Err(Error::DanglingTransform { node: name.clone() });
                }
            }
            NodeKind::Sink => {
                let overflow_count = spec
                    .edges
                    .iter()
                    .filter(|e| &e.from == name && e.link_type == LinkType::Overflow)
                    .count();
                if overflow_count > 1 {
                    return Err(Error::MultipleOverflow { node: name.clone() });
                }
            }
            NodeKind::Source => {}
        }
    }
    Ok(())
}

/// Depth-first three-color search over the sub-graph restricted to one link
/// type. Returns the first node found on a cycle.
fn check_acyclic(spec: &PipelineSpec, link_type: LinkType) -> Result<(), String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in spec.edges.iter().filter(|e| e.link_type == link_type) {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut colors: HashMap<&str, Color> =
        spec.nodes.keys().map(|n| (n.as_str(), Color::White)).collect();

    for start in spec.nodes.keys() {
        if colors[start.as_str()] != Color::White {
            continue;
        }
        // Iterative DFS; (node, next-child-index) frames.
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        let _ = colors.insert(start.as_str(), Color::Gray);

        while let Some((node, child)) = stack.pop() {
            let children = adjacency.get(node).map(Vec::as_slice).unwrap_or_default();
            if child < children.len() {
                stack.push((node, child + 1));
                let next = children[child];
                match colors[next] {
                    Color::Gray => return Err(next.to_owned()),
                    Color::White => {
                        let _ = colors.insert(next, Color::Gray);
                        stack.push((next, 0));
                    }
                    Color::Black => {}
                }
            } else {
                let _ = colors.insert(node, Color::Black);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;

    fn resolver(node: &NodeSpec) -> Option<NodeKind> {
        match node.type_tag.as_str() {
            "src" => Some(NodeKind::Source),
            "xform" => Some(NodeKind::Transform),
            "snk" => Some(NodeKind::Sink),
            _ => None,
        }
    }

    fn parse(text: &str) -> PipelineSpec {
        PipelineSpec::parse(text).expect("parse")
    }

    #[test]
    fn accepts_linear_topology() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; f [type="xform"]; z [type="snk"];
                a -> f -> z;
            }
            "#,
        );
        let kinds = spec.validate(resolver).expect("valid");
        assert_eq!(kinds["a"], NodeKind::Source);
        assert_eq!(kinds["f"], NodeKind::Transform);
        assert_eq!(kinds["z"], NodeKind::Sink);
    }

    #[test]
    fn rejects_unknown_stage_type() {
        let spec = parse(r#"digraph { a [type="nope"]; }"#);
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::UnknownStageType { type_tag, .. } if type_tag == "nope"));
    }

    #[test]
    fn rejects_undeclared_endpoint() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"];
                a -> ghost;
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::UndeclaredNode { node, .. } if node == "ghost"));
    }

    #[test]
    fn rejects_normal_cycle() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; f [type="xform"]; g [type="xform"]; z [type="snk"];
                a -> f; f -> g; g -> f; g -> z;
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::NormalCycle { .. }));
    }

    #[test]
    fn rejects_sink_to_sink_normal_edge() {
        let spec = parse(
            r#"
            digraph {
                a [type="snk"]; b [type="snk"];
                a -> b;
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::IncompatibleEdge { .. }));
    }

    #[test]
    fn accepts_sink_overflow_to_sink() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; p [type="snk"]; spool [type="snk"];
                a -> p;
                p -> spool [type="Buffer"];
            }
            "#,
        );
        assert!(spec.validate(resolver).is_ok());
    }

    #[test]
    fn rejects_overflow_from_transform() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; f [type="xform"]; z [type="snk"];
                a -> f; f -> z [type="Buffer"];
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::IncompatibleEdge { .. }));
    }

    #[test]
    fn rejects_second_overflow_edge() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; p [type="snk"]; s1 [type="snk"]; s2 [type="snk"];
                a -> p;
                p -> s1 [type="Buffer"];
                p -> s2 [type="Buffer"];
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::MultipleOverflow { node } if node == "p"));
    }

    #[test]
    fn rejects_overflow_cycle() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; p [type="snk"]; q [type="snk"];
                a -> p;
                p -> q [type="Buffer"];
                q -> p [type="Buffer"];
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::OverflowCycle { .. }));
    }

    #[test]
    fn rejects_self_loop() {
        let spec = parse(
            r#"
            digraph {
                f [type="xform"];
                f -> f;
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::SelfLoop { node } if node == "f"));
    }

    #[test]
    fn rejects_transform_without_output() {
        let spec = parse(
            r#"
            digraph {
                a [type="src"]; f [type="xform"];
                a -> f;
            }
            "#,
        );
        let err = spec.validate(resolver).expect_err("invalid");
        assert!(matches!(err, Error::DanglingTransform { node } if node == "f"));
    }
}
