// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Reconstruction of the nested schema tree from the flat schema element
//! list in the file footer.

use std::fmt;

use crate::basic::Repetition;
use crate::errors::Result;
use crate::format::SchemaElement;

/// A node in the file's schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// The raw schema entry for this node.
    pub element: SchemaElement,
    pub children: Vec<SchemaNode>,
    /// For leaves, the index into the flat column list of each row group;
    /// -1 for internal nodes.
    pub col_idx: i32,
    /// Maximum definition level along the path from the root. Fits in 8
    /// bits: the nesting depth is capped at 100.
    pub max_def_level: i16,
    /// Maximum repetition level along the path from the root.
    pub max_rep_level: i16,
    /// Definition level at which the nearest enclosing repeated field is
    /// empty, used to distinguish an empty collection from a missing value.
    pub def_level_of_immediate_repeated_ancestor: i16,
}

impl SchemaNode {
    pub fn is_repeated(&self) -> bool {
        self.element.repetition_type == Some(Repetition::REPEATED)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let repetition = self
            .element
            .repetition_type
            .map(|r| r.to_string())
            .unwrap_or_else(|| "root".to_owned());
        let kind = match self.element.type_ {
            Some(t) if self.children.is_empty() => t.to_string(),
            _ => "struct".to_owned(),
        };
        write!(
            f,
            "{:indent$}{} {} {} [i:{} d:{} r:{}]",
            "",
            repetition,
            kind,
            self.element.name,
            self.col_idx,
            self.max_def_level,
            self.max_rep_level
        )?;
        for child in &self.children {
            writeln!(f)?;
            child.fmt_indent(f, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

/// Builds the schema tree by a depth-first walk of the flat element list,
/// incrementing the definition level on OPTIONAL and REPEATED parents, the
/// repetition level on REPEATED parents, and the column index for every
/// leaf.
pub fn build_schema_tree(schema: &[SchemaElement]) -> Result<SchemaNode> {
    let mut idx = 0;
    let mut col_idx = 0;
    let root = build_node(schema, 0, 0, 0, &mut idx, &mut col_idx)?;
    if idx != schema.len() {
        return Err(general_err!(
            "file schema has {} trailing elements not reachable from the root",
            schema.len() - idx
        ));
    }
    Ok(root)
}

fn build_node(
    schema: &[SchemaElement],
    mut max_def_level: i16,
    mut max_rep_level: i16,
    mut ira_def_level: i16,
    idx: &mut usize,
    col_idx: &mut i32,
) -> Result<SchemaNode> {
    let Some(element) = schema.get(*idx) else {
        return Err(general_err!(
            "could not reconstruct schema tree from flattened schema in file metadata"
        ));
    };
    *idx += 1;

    let num_children = element.num_children.unwrap_or(0);
    let is_leaf = num_children == 0;

    // The immediate-repeated-ancestor level excludes this node, so record
    // it before updating.
    let node_ira = ira_def_level;
    match element.repetition_type {
        Some(Repetition::OPTIONAL) => max_def_level += 1,
        Some(Repetition::REPEATED) => {
            max_rep_level += 1;
            // A repeated field adds a definition level, distinguishing an
            // empty list from a list with an item in it.
            max_def_level += 1;
            ira_def_level = max_def_level;
        }
        _ => {}
    }

    let mut node = SchemaNode {
        element: element.clone(),
        children: Vec::with_capacity(num_children as usize),
        col_idx: if is_leaf {
            let this = *col_idx;
            *col_idx += 1;
            this
        } else {
            -1
        },
        max_def_level,
        max_rep_level,
        def_level_of_immediate_repeated_ancestor: node_ira,
    };

    for _ in 0..num_children {
        node.children.push(build_node(
            schema,
            max_def_level,
            max_rep_level,
            ira_def_level,
            idx,
            col_idx,
        )?);
    }
    Ok(node)
}
