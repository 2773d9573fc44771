// SPDX-License-Identifier: Apache-2.0

//! Parser for the DOT-subset graph language.

use crate::error::Error;
use crate::{EdgeSpec, LinkType, NodeSpec, PipelineSpec};
use pest::Parser as _;
use pest::iterators::Pair;
use std::collections::HashMap;

/// Edge attribute selecting the overflow link type.
const EDGE_TYPE_ATTR: &str = "type";
const EDGE_TYPE_OVERFLOW: &str = "Buffer";
const EDGE_CAPACITY_ATTR: &str = "capacity";
const NODE_TYPE_ATTR: &str = "type";

mod grammar {
    #![allow(missing_docs, unused_qualifications)]

    #[derive(pest_derive::Parser)]
    #[grammar = "graph.pest"]
    pub(super) struct GraphParser;
}

use grammar::{GraphParser, Rule};

pub(crate) fn parse(text: &str) -> Result<PipelineSpec, Error> {
    let mut pairs = GraphParser::parse(Rule::graph_file, text).map_err(|e| Error::Parse {
        message: e.to_string(),
    })?;

    let graph = pairs.next().ok_or_else(|| Error::Parse {
        message: "empty graph".to_owned(),
    })?;

    let mut spec = PipelineSpec::default();
    for pair in graph.into_inner() {
        walk_stmt(pair, &mut spec)?;
    }
    Ok(spec)
}

fn walk_stmt(pair: Pair<'_, Rule>, spec: &mut PipelineSpec) -> Result<(), Error> {
    match pair.as_rule() {
        Rule::subgraph => walk_subgraph(pair, spec),
        Rule::edge_stmt => walk_edge(pair, spec),
        Rule::node_stmt => walk_node(pair, spec),
        Rule::graph_attr => {
            let mut inner = pair.into_inner();
            let key = expect_ident(&mut inner)?;
            let value = inner.next().map(value_text).unwrap_or_default();
            let _ = spec.attrs.insert(key, value);
            Ok(())
        }
        Rule::ident | Rule::EOI => Ok(()),
        rule => Err(Error::Parse {
            message: format!("unexpected statement `{rule:?}`"),
        }),
    }
}

fn walk_subgraph(pair: Pair<'_, Rule>, spec: &mut PipelineSpec) -> Result<(), Error> {
    let mut name = String::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::ident {
            name = inner.as_str().to_owned();
            continue;
        }
        // Nodes declared in a subgraph belong to the flat graph; a subgraph
        // inside a subgraph exceeds the single supported nesting level.
        if inner.as_rule() == Rule::subgraph {
            return Err(Error::SubgraphTooDeep { subgraph: name });
        }
        walk_stmt(inner, spec)?;
    }
    Ok(())
}

fn walk_node(pair: Pair<'_, Rule>, spec: &mut PipelineSpec) -> Result<(), Error> {
    let mut inner = pair.into_inner();
    let name = expect_ident(&mut inner)?;
    let mut attrs = match inner.next() {
        Some(list) => parse_attr_list(list)?,
        None => HashMap::new(),
    };

    if spec.nodes.contains_key(&name) {
        return Err(Error::DuplicateNode { node: name });
    }
    let type_tag = attrs
        .remove(NODE_TYPE_ATTR)
        .ok_or_else(|| Error::MissingAttribute {
            node: name.clone(),
            attribute: NODE_TYPE_ATTR.to_owned(),
        })?;

    let _ = spec.nodes.insert(
        name.clone(),
        NodeSpec {
            name,
            type_tag,
            attrs,
        },
    );
    Ok(())
}

fn walk_edge(pair: Pair<'_, Rule>, spec: &mut PipelineSpec) -> Result<(), Error> {
    let mut endpoints = Vec::new();
    let mut attrs = HashMap::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => endpoints.push(inner.as_str().to_owned()),
            Rule::attr_list => attrs = parse_attr_list(inner)?,
            rule => {
                return Err(Error::Parse {
                    message: format!("unexpected token in edge statement: `{rule:?}`"),
                });
            }
        }
    }

    let link_type = match attrs.get(EDGE_TYPE_ATTR).map(String::as_str) {
        Some(EDGE_TYPE_OVERFLOW) => LinkType::Overflow,
        _ => LinkType::Normal,
    };
    for window in endpoints.windows(2) {
        let (from, to) = (window[0].clone(), window[1].clone());
        let capacity = match attrs.get(EDGE_CAPACITY_ATTR) {
            None => None,
            Some(raw) => {
                Some(
                    raw.parse::<usize>()
                        .map_err(|e| Error::InvalidEdgeAttribute {
                            from: from.clone(),
                            to: to.clone(),
                            attribute: EDGE_CAPACITY_ATTR.to_owned(),
                            reason: e.to_string(),
                        })?,
                )
            }
        };
        spec.edges.push(EdgeSpec {
            from,
            to,
            link_type,
            capacity,
        });
    }
    Ok(())
}

fn parse_attr_list(pair: Pair<'_, Rule>) -> Result<HashMap<String, String>, Error> {
    let mut attrs = HashMap::new();
    for attr in pair.into_inner() {
        let mut inner = attr.into_inner();
        let key = expect_ident(&mut inner)?;
        let value = inner.next().map(value_text).unwrap_or_default();
        let _ = attrs.insert(key, value);
    }
    Ok(attrs)
}

fn expect_ident(pairs: &mut pest::iterators::Pairs<'_, Rule>) -> Result<String, Error> {
    match pairs.next() {
        Some(pair) if pair.as_rule() == Rule::ident => Ok(pair.as_str().to_owned()),
        other => Err(Error::Parse {
            message: format!("expected identifier, found `{other:?}`"),
        }),
    }
}

fn value_text(pair: Pair<'_, Rule>) -> String {
    match pair.as_rule() {
        Rule::quoted => pair
            .into_inner()
            .next()
            .map(|inner| inner.as_str().to_owned())
            .unwrap_or_default(),
        _ => pair.as_str().to_owned(),
    }
}
