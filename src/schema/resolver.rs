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

//! Resolution of request paths against the file's schema tree.
//!
//! There are three array encodings in the wild:
//!
//! 1. One-level: a bare repeated field, interpreted as a required array of
//!    required items:
//!    `repeated <item-type> item;`
//! 2. Two-level: a group containing a single repeated field:
//!    `<list-repetition> group <name> { repeated <item-type> item; }`
//! 3. Three-level, the encoding the Parquet spec prescribes:
//!    `<list-repetition> group <name> { repeated group list {
//!    <item-repetition> <item-type> item; } }`
//!
//! Field annotations and names are ignored, making resolution more
//! permissive than the Parquet spec dictates. A path is resolved by trying
//! each encoding; a failure under one encoding may be a success under
//! another.

use tracing::debug;

use crate::errors::{Result, ScanError};
use crate::scan::descriptors::{path, ColumnDesc, ColumnType, SchemaPath};

use super::tree::SchemaNode;

/// Array encoding convention attempted during one resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayEncoding {
    OneLevel,
    TwoLevel,
    ThreeLevel,
}

/// How unresolved columns are matched against the file schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaResolution {
    #[default]
    Name,
    Position,
}

/// Outcome of resolving one request path.
#[derive(Debug)]
pub struct PathResolution<'a> {
    /// The schema node the path lands on; `None` for a missing field or the
    /// artificial position field.
    pub node: Option<&'a SchemaNode>,
    /// The path names the artificial 64-bit position field of an array.
    pub pos_field: bool,
    /// The file simply does not contain the requested field; the caller
    /// NULLs the slot in the template tuple.
    pub missing_field: bool,
}

pub struct SchemaResolver<'a> {
    root: &'a SchemaNode,
    table_cols: &'a [ColumnDesc],
    num_partition_keys: usize,
    mode: SchemaResolution,
    filename: &'a str,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(
        root: &'a SchemaNode,
        table_cols: &'a [ColumnDesc],
        num_partition_keys: usize,
        mode: SchemaResolution,
        filename: &'a str,
    ) -> Self {
        Self {
            root,
            table_cols,
            num_partition_keys,
            mode,
            filename,
        }
    }

    /// Resolves `path`, trying the two-level, three-level and one-level
    /// array encodings in that order. If every encoding fails with an
    /// unrecognized schema, the three-level error is surfaced since that
    /// encoding is the standard.
    pub fn resolve_path(&self, request_path: &SchemaPath) -> Result<PathResolution<'a>> {
        let mut missing_field = false;
        let mut three_level_error = None;
        for encoding in [
            ArrayEncoding::TwoLevel,
            ArrayEncoding::ThreeLevel,
            ArrayEncoding::OneLevel,
        ] {
            match self.resolve_path_helper(encoding, request_path) {
                Ok(resolution) if resolution.missing_field => missing_field = true,
                Ok(resolution) => return Ok(resolution),
                Err(e) => {
                    if encoding == ArrayEncoding::ThreeLevel {
                        three_level_error = Some(e);
                    }
                }
            }
        }
        if missing_field {
            return Ok(PathResolution {
                node: None,
                pos_field: false,
                missing_field: true,
            });
        }
        Err(three_level_error
            .unwrap_or_else(|| general_err!("path resolution failed for '{}'", self.filename)))
    }

    fn resolve_path_helper(
        &self,
        encoding: ArrayEncoding,
        request_path: &SchemaPath,
    ) -> Result<PathResolution<'a>> {
        let missing = || {
            Ok(PathResolution {
                node: None,
                pos_field: false,
                missing_field: true,
            })
        };

        let mut node = self.root;
        let mut col_type: Option<&ColumnType> = None;
        for (i, &table_idx) in request_path.iter().enumerate() {
            // Advance the schema node, unless the previous step resolved a
            // one- or two-level array: there the repeated field represents
            // both the array and its item, so the node stays put.
            let prev_is_array = matches!(col_type, Some(ColumnType::Array(_)));
            if i == 0 || !prev_is_array || encoding == ArrayEncoding::ThreeLevel {
                match self.next_schema_node(col_type, request_path, i, node)? {
                    Some(next) => node = next,
                    None => return missing(),
                }
            } else {
                debug_assert!(node.is_repeated());
            }

            // Advance the table type.
            col_type = Some(match col_type {
                None => &self.table_cols[table_idx].col_type,
                Some(ColumnType::Struct(fields)) => &fields[table_idx].1,
                Some(ColumnType::Array(item)) => {
                    debug_assert_eq!(table_idx, path::ARRAY_ITEM);
                    item
                }
                Some(ColumnType::Map(key, value)) => {
                    if table_idx == path::MAP_KEY {
                        key
                    } else {
                        value
                    }
                }
                Some(other) => {
                    return Err(general_err!(
                        "path step {} descends into scalar type {:?}",
                        i,
                        other
                    ))
                }
            });

            match col_type.unwrap() {
                ColumnType::Array(_) => {
                    match self.resolve_array(encoding, request_path, i, node)? {
                        ArrayStep::Node(next) => node = next,
                        ArrayStep::PosField => {
                            return Ok(PathResolution {
                                node: None,
                                pos_field: true,
                                missing_field: false,
                            })
                        }
                    }
                }
                ColumnType::Map(_, _) => {
                    node = self.resolve_map(request_path, i, node)?;
                }
                ColumnType::Struct(_) => {}
                scalar => {
                    debug_assert_eq!(i, request_path.len() - 1);
                    self.validate_scalar_node(node, scalar, request_path, i)?;
                }
            }
        }
        Ok(PathResolution {
            node: Some(node),
            pos_field: false,
            missing_field: false,
        })
    }

    /// Steps from `node` to the child named by `request_path[next_idx]`,
    /// resolving by name or position per the configured mode. Returns
    /// `None` when the file does not contain the field.
    fn next_schema_node(
        &self,
        col_type: Option<&ColumnType>,
        request_path: &SchemaPath,
        next_idx: usize,
        node: &'a SchemaNode,
    ) -> Result<Option<&'a SchemaNode>> {
        let table_idx = request_path[next_idx];
        let file_idx = match self.mode {
            SchemaResolution::Name => match col_type {
                None => {
                    debug_assert_eq!(next_idx, 0);
                    find_child_with_name(node, &self.table_cols[table_idx].name)
                }
                Some(ColumnType::Struct(fields)) => {
                    find_child_with_name(node, &fields[table_idx].0)
                }
                // Arrays have only one child in the file.
                Some(ColumnType::Array(_)) => Some(table_idx),
                Some(ColumnType::Map(_, _)) => {
                    // Map children are supposed to be ordered "key" then
                    // "value", but resolve by name in case they are
                    // switched, and fall back to the position otherwise.
                    let name = if table_idx == path::MAP_KEY {
                        "key"
                    } else {
                        "value"
                    };
                    find_child_with_name(node, name).or(Some(table_idx))
                }
                Some(other) => {
                    return Err(general_err!(
                        "cannot resolve a child of scalar type {:?}",
                        other
                    ))
                }
            },
            SchemaResolution::Position => {
                if next_idx == 0 {
                    // The first index of a path counts the table's
                    // partition keys, which are not stored in the file.
                    table_idx.checked_sub(self.num_partition_keys)
                } else {
                    Some(table_idx)
                }
            }
        };
        match file_idx {
            Some(idx) if idx < node.children.len() => Ok(Some(&node.children[idx])),
            _ => {
                debug!(
                    file = self.filename,
                    path = ?request_path,
                    mode = ?self.mode,
                    "file does not contain requested path"
                );
                Ok(None)
            }
        }
    }

    fn unrecognized(&self, request_path: &SchemaPath, idx: usize, expected: &str) -> ScanError {
        ScanError::UnrecognizedSchema(format!(
            "file '{}' path {:?} step {}: expected {}, file schema is:\n{}",
            self.filename, request_path, idx, expected, self.root
        ))
    }

    /// Resolves the array at `node` under the given encoding. The resulting
    /// node is the repeated field for all three encodings.
    fn resolve_array(
        &self,
        encoding: ArrayEncoding,
        request_path: &SchemaPath,
        idx: usize,
        node: &'a SchemaNode,
    ) -> Result<ArrayStep<'a>> {
        let node = match encoding {
            ArrayEncoding::OneLevel => {
                if !node.is_repeated() {
                    return Err(self.unrecognized(request_path, idx, "array (bare repeated field)"));
                }
                node
            }
            // In the multi-level cases the outer group must contain a
            // single repeated field.
            ArrayEncoding::TwoLevel | ArrayEncoding::ThreeLevel => {
                if node.children.len() != 1 || !node.children[0].is_repeated() {
                    return Err(self.unrecognized(
                        request_path,
                        idx,
                        "array (group with one repeated child)",
                    ));
                }
                &node.children[0]
            }
        };
        if let Some(&next) = request_path.get(idx + 1) {
            if next == path::ARRAY_POS {
                debug_assert_eq!(request_path.len(), idx + 2, "position field has no children");
                return Ok(ArrayStep::PosField);
            }
            debug_assert_eq!(next, path::ARRAY_ITEM);
        }
        Ok(ArrayStep::Node(node))
    }

    /// Maps are groups containing one repeated group with exactly a key and
    /// a value child; resolves to the repeated key/value field.
    fn resolve_map(
        &self,
        request_path: &SchemaPath,
        idx: usize,
        node: &'a SchemaNode,
    ) -> Result<&'a SchemaNode> {
        if node.children.len() != 1
            || !node.children[0].is_repeated()
            || node.children[0].children.len() != 2
        {
            return Err(self.unrecognized(
                request_path,
                idx,
                "map (group with one repeated two-child group)",
            ));
        }
        if let Some(&next) = request_path.get(idx + 1) {
            debug_assert!(next == path::MAP_KEY || next == path::MAP_VALUE);
        }
        Ok(&node.children[0])
    }

    /// A terminal scalar step must land on a leaf whose physical type
    /// matches the requested logical type.
    fn validate_scalar_node(
        &self,
        node: &SchemaNode,
        col_type: &ColumnType,
        request_path: &SchemaPath,
        idx: usize,
    ) -> Result<()> {
        if !node.children.is_empty() {
            return Err(self.unrecognized(request_path, idx, "scalar leaf"));
        }
        if node.element.type_ != Some(col_type.physical_type()) {
            return Err(self.unrecognized(
                request_path,
                idx,
                &format!("physical type {}", col_type.physical_type()),
            ));
        }
        Ok(())
    }
}

enum ArrayStep<'a> {
    Node(&'a SchemaNode),
    PosField,
}

fn find_child_with_name(node: &SchemaNode, name: &str) -> Option<usize> {
    node.children
        .iter()
        .position(|c| c.element.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Repetition, Type};
    use crate::schema::tree::build_schema_tree;
    use crate::util::test_common::{group, leaf, schema_elements};

    fn table() -> Vec<ColumnDesc> {
        vec![
            ColumnDesc {
                name: "id".into(),
                col_type: ColumnType::BigInt,
            },
            ColumnDesc {
                name: "tags".into(),
                col_type: ColumnType::Array(Box::new(ColumnType::Int)),
            },
            ColumnDesc {
                name: "attrs".into(),
                col_type: ColumnType::Map(
                    Box::new(ColumnType::String),
                    Box::new(ColumnType::Int),
                ),
            },
        ]
    }

    fn resolve<'a>(
        root: &'a SchemaNode,
        cols: &'a [ColumnDesc],
        mode: SchemaResolution,
        request_path: &SchemaPath,
    ) -> Result<PathResolution<'a>> {
        SchemaResolver::new(root, cols, 0, mode, "test.parquet").resolve_path(request_path)
    }

    #[test]
    fn test_three_level_array() {
        let schema = schema_elements(
            vec![
                leaf("id", Type::INT64, Repetition::REQUIRED),
                group("tags", Repetition::OPTIONAL, 1),
                group("list", Repetition::REPEATED, 1),
                leaf("item", Type::INT32, Repetition::OPTIONAL),
            ],
            2,
        );
        let root = build_schema_tree(&schema).unwrap();
        let cols = table();

        let res = resolve(&root, &cols, SchemaResolution::Name, &vec![1, path::ARRAY_ITEM]).unwrap();
        let node = res.node.unwrap();
        assert_eq!(node.element.name, "item");
        assert_eq!(node.col_idx, 1);
    }

    #[test]
    fn test_two_level_array() {
        let schema = schema_elements(
            vec![
                group("tags", Repetition::OPTIONAL, 1),
                leaf("item", Type::INT32, Repetition::REPEATED),
            ],
            1,
        );
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![ColumnDesc {
            name: "tags".into(),
            col_type: ColumnType::Array(Box::new(ColumnType::Int)),
        }];
        let res = resolve(&root, &cols, SchemaResolution::Name, &vec![0, path::ARRAY_ITEM]).unwrap();
        let node = res.node.unwrap();
        assert!(node.is_repeated());
        assert_eq!(node.element.name, "item");
    }

    #[test]
    fn test_one_level_array() {
        let schema = schema_elements(vec![leaf("tags", Type::INT32, Repetition::REPEATED)], 1);
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![ColumnDesc {
            name: "tags".into(),
            col_type: ColumnType::Array(Box::new(ColumnType::Int)),
        }];
        let res = resolve(&root, &cols, SchemaResolution::Name, &vec![0, path::ARRAY_ITEM]).unwrap();
        let node = res.node.unwrap();
        assert!(node.is_repeated());
        assert_eq!(node.col_idx, 0);
    }

    #[test]
    fn test_array_pos_field() {
        let schema = schema_elements(
            vec![
                group("tags", Repetition::OPTIONAL, 1),
                group("list", Repetition::REPEATED, 1),
                leaf("item", Type::INT32, Repetition::OPTIONAL),
            ],
            1,
        );
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![ColumnDesc {
            name: "tags".into(),
            col_type: ColumnType::Array(Box::new(ColumnType::Int)),
        }];
        let res = resolve(&root, &cols, SchemaResolution::Name, &vec![0, path::ARRAY_POS]).unwrap();
        assert!(res.pos_field);
        assert!(res.node.is_none());
    }

    #[test]
    fn test_map_key_value() {
        let schema = schema_elements(
            vec![
                group("attrs", Repetition::OPTIONAL, 1),
                group("key_value", Repetition::REPEATED, 2),
                leaf("key", Type::BYTE_ARRAY, Repetition::REQUIRED),
                leaf("value", Type::INT32, Repetition::OPTIONAL),
            ],
            1,
        );
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![ColumnDesc {
            name: "attrs".into(),
            col_type: ColumnType::Map(Box::new(ColumnType::String), Box::new(ColumnType::Int)),
        }];
        let key = resolve(&root, &cols, SchemaResolution::Name, &vec![0, path::MAP_KEY]).unwrap();
        assert_eq!(key.node.unwrap().element.name, "key");
        let value =
            resolve(&root, &cols, SchemaResolution::Name, &vec![0, path::MAP_VALUE]).unwrap();
        assert_eq!(value.node.unwrap().element.name, "value");
    }

    #[test]
    fn test_missing_field() {
        let schema = schema_elements(vec![leaf("id", Type::INT64, Repetition::REQUIRED)], 1);
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![
            ColumnDesc {
                name: "id".into(),
                col_type: ColumnType::BigInt,
            },
            ColumnDesc {
                name: "absent".into(),
                col_type: ColumnType::Int,
            },
        ];
        let res = resolve(&root, &cols, SchemaResolution::Name, &vec![1]).unwrap();
        assert!(res.missing_field);
        assert!(res.node.is_none());
    }

    #[test]
    fn test_position_mode_skips_partition_keys() {
        let schema = schema_elements(vec![leaf("c0", Type::INT64, Repetition::REQUIRED)], 1);
        let root = build_schema_tree(&schema).unwrap();
        // Table: [part_key, id]; partition key not stored in the file.
        let cols = vec![
            ColumnDesc {
                name: "part_key".into(),
                col_type: ColumnType::Int,
            },
            ColumnDesc {
                name: "id".into(),
                col_type: ColumnType::BigInt,
            },
        ];
        let resolver =
            SchemaResolver::new(&root, &cols, 1, SchemaResolution::Position, "test.parquet");
        let res = resolver.resolve_path(&vec![1]).unwrap();
        assert_eq!(res.node.unwrap().element.name, "c0");
    }

    #[test]
    fn test_type_mismatch_is_unrecognized() {
        let schema = schema_elements(vec![leaf("id", Type::INT32, Repetition::REQUIRED)], 1);
        let root = build_schema_tree(&schema).unwrap();
        let cols = vec![ColumnDesc {
            name: "id".into(),
            col_type: ColumnType::BigInt,
        }];
        let err = resolve(&root, &cols, SchemaResolution::Name, &vec![0]).unwrap_err();
        assert!(matches!(err, ScanError::UnrecognizedSchema(_)));
    }
}
