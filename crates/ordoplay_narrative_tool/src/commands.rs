// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations.

use crate::cli::Command;
use ordoplay_narrative_graph::narrative::{
    ChoiceNode, ConditionNode, ModifierNode, TextNode, CHOICE_NODE_TYPE, CONDITION_NODE_TYPE, END_NODE_TYPE,
    FALSE_PORT, MODIFIER_NODE_TYPE, NEXT_PORT, TEXT_NODE_TYPE,
};
use ordoplay_narrative_graph::{
    create_narrative_registry, DirectoryAssetResolver, DocumentFormat, GraphDocument, GraphPersistence,
    GraphSettings, GraphTracer, NodeId, NodeRecord, PersistenceError, PropertyCodec, SettingsError, TracerError,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Error from running a command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Tracer(#[from] TracerError),
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
    #[error("{path:?} already exists")]
    AlreadyExists { path: std::path::PathBuf },
}

pub struct Runner {
    persistence: GraphPersistence,
}

impl Runner {
    pub fn new(settings: GraphSettings) -> Self {
        let registry = Arc::new(create_narrative_registry());
        Self {
            persistence: GraphPersistence::new(registry, settings),
        }
    }

    pub fn run(&self, command: Command, out: &mut impl Write) -> Result<(), CommandError> {
        match command {
            Command::Check { path } => self.check(&path, out),
            Command::Trace {
                path,
                picks,
                max_steps,
            } => self.trace(&path, &picks, max_steps, out),
            Command::Convert { input, output } => self.convert(&input, &output, out),
            Command::New { path, name } => self.create(&path, name, out),
        }
    }

    fn check(&self, path: &Path, out: &mut impl Write) -> Result<(), CommandError> {
        let outcome = self.persistence.load(path)?;
        let document = &outcome.document;
        writeln!(
            out,
            "{}: {} nodes, {} links, {} groups, {} flags",
            document.name,
            document.node_count(),
            document.link_count(),
            document.group_count(),
            document.flag_count()
        )?;
        if document.start_node().is_none() {
            writeln!(out, "warning: no start node")?;
        }
        for warning in &outcome.warnings {
            writeln!(out, "warning: {warning}")?;
        }
        Ok(())
    }

    fn convert(&self, input: &Path, output: &Path, out: &mut impl Write) -> Result<(), CommandError> {
        let outcome = self.persistence.load(input)?;
        let id = self.persistence.save(&outcome.document, output)?;
        writeln!(
            out,
            "Converted {:?} to {:?} ({} warnings, id {})",
            input,
            output,
            outcome.warnings.len(),
            id
        )?;
        Ok(())
    }

    fn create(&self, path: &Path, name: Option<String>, out: &mut impl Write) -> Result<(), CommandError> {
        if path.exists() {
            return Err(CommandError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .map_or_else(|| "Untitled".to_string(), |s| s.to_string_lossy().into_owned())
        });
        let document = if self.persistence.settings().insert_start_node {
            GraphDocument::new_with_start(name)
        } else {
            GraphDocument::new(name)
        };
        let id = self.persistence.save(&document, path)?;
        let format = DocumentFormat::from_path(path).unwrap_or(self.persistence.settings().format);
        writeln!(out, "Created {:?} as {:?} document {}", path, format, id)?;
        Ok(())
    }

    fn trace(&self, path: &Path, picks: &[usize], max_steps: usize, out: &mut impl Write) -> Result<(), CommandError> {
        let outcome = self.persistence.load(path)?;
        let resolver = match path.parent() {
            Some(dir) => DirectoryAssetResolver::new(dir),
            None => DirectoryAssetResolver::new("."),
        };
        let codec = PropertyCodec::new(Arc::new(resolver));
        let mut tracer = GraphTracer::new(outcome.document, self.persistence.registry().clone(), codec);
        let mut flags = tracer.flag_state();
        let mut picks = picks.iter().copied();

        let mut current = tracer.adjacent_from_start().first().map(|n| n.id);
        let mut steps = 0;

        while let Some(node_id) = current {
            if steps == max_steps {
                writeln!(out, "[stopped after {max_steps} steps]")?;
                return Ok(());
            }
            steps += 1;

            tracer.select_node(node_id);
            let Some(record) = tracer.current_node().cloned() else {
                break;
            };
            current = self.step(&tracer, &record, &mut flags, &mut picks, out)?;
        }

        writeln!(out, "[end]")?;
        Ok(())
    }

    /// Print one node and pick the next one
    fn step(
        &self,
        tracer: &GraphTracer,
        record: &NodeRecord,
        flags: &mut ordoplay_narrative_graph::FlagState,
        picks: &mut impl Iterator<Item = usize>,
        out: &mut impl Write,
    ) -> Result<Option<NodeId>, CommandError> {
        let node = tracer.materialize(record)?;
        let first_successor = |port: &str| {
            tracer
                .connected_nodes_from_port(record.id, port, 0)
                .first()
                .map(|n| n.id)
        };

        let next = match record.type_tag.as_str() {
            TEXT_NODE_TYPE => {
                if let Some(text) = node.downcast_ref::<TextNode>() {
                    if text.speaker.is_empty() {
                        writeln!(out, "{}", text.text)?;
                    } else {
                        writeln!(out, "{}: {}", text.speaker, text.text)?;
                    }
                }

                let successors = tracer.connected_nodes(record.id);
                let choices: Vec<&NodeRecord> = successors
                    .iter()
                    .copied()
                    .filter(|n| n.type_tag == CHOICE_NODE_TYPE)
                    .collect();
                if choices.is_empty() {
                    successors.first().map(|n| n.id)
                } else {
                    for (index, choice) in choices.iter().enumerate() {
                        let label = tracer
                            .materialize(choice)
                            .ok()
                            .and_then(|m| m.downcast_ref::<ChoiceNode>().map(|c| c.text.clone()))
                            .unwrap_or_default();
                        writeln!(out, "  {index}) {label}")?;
                    }
                    let pick = picks.next().unwrap_or(0).min(choices.len() - 1);
                    writeln!(out, "  > {pick}")?;
                    Some(choices[pick].id)
                }
            }
            CHOICE_NODE_TYPE => first_successor(NEXT_PORT),
            CONDITION_NODE_TYPE => {
                let port = node
                    .downcast_ref::<ConditionNode>()
                    .and_then(|c| {
                        let branch = c.branch(flags);
                        if branch.is_none() {
                            tracing::warn!("Condition {} tests unknown flag {:?}", record.id, c.flag);
                        }
                        branch
                    })
                    .unwrap_or(FALSE_PORT);
                first_successor(port)
            }
            MODIFIER_NODE_TYPE => {
                if let Some(modifier) = node.downcast_ref::<ModifierNode>() {
                    if !modifier.apply(flags) {
                        tracing::warn!("Modifier {} could not update flag {:?}", record.id, modifier.flag);
                    }
                }
                first_successor(NEXT_PORT)
            }
            END_NODE_TYPE => None,
            _ => tracer.connected_nodes(record.id).first().map(|n| n.id),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_narrative_graph::narrative::TRUE_PORT;
    use ordoplay_narrative_graph::{ConnectionValidator, FlagValue, LinkRecord, PropertyType, PropertyValue};

    fn text(registry: &ordoplay_narrative_graph::NodeTypeRegistry, tag: &str, value: &str) -> NodeRecord {
        let codec = PropertyCodec::plain();
        let mut record = registry.create_node(tag, &codec).unwrap();
        record.set_property(
            codec
                .encode_record("text", &PropertyValue::String(value.to_string()), PropertyType::String)
                .unwrap(),
        );
        record
    }

    /// Start -> "Hello" -> {"Stay", "Leave"}; "Leave" -> modifier(left = true) -> condition(left) -> "Bye"
    fn write_story(path: &Path) {
        let registry = create_narrative_registry();
        let codec = PropertyCodec::plain();
        let validator = ConnectionValidator::narrative();
        let mut doc = GraphDocument::new_with_start("Story");
        doc.set_flag("left", FlagValue::Bool(false)).unwrap();
        let start = doc.start_node().unwrap().id;

        let hello = doc.add_node(text(&registry, TEXT_NODE_TYPE, "Hello")).unwrap();
        let stay = doc.add_node(text(&registry, CHOICE_NODE_TYPE, "Stay")).unwrap();
        let leave = doc.add_node(text(&registry, CHOICE_NODE_TYPE, "Leave")).unwrap();

        let mut modifier = registry.create_node(MODIFIER_NODE_TYPE, &codec).unwrap();
        modifier.set_property(
            codec
                .encode_record("flag", &PropertyValue::String("left".to_string()), PropertyType::String)
                .unwrap(),
        );
        modifier.set_property(codec.encode_record("value", &PropertyValue::Int(1), PropertyType::Int).unwrap());
        let modifier = doc.add_node(modifier).unwrap();

        let mut condition = registry.create_node(CONDITION_NODE_TYPE, &codec).unwrap();
        condition.set_property(
            codec
                .encode_record("flag", &PropertyValue::String("left".to_string()), PropertyType::String)
                .unwrap(),
        );
        condition.set_property(codec.encode_record("value", &PropertyValue::Int(1), PropertyType::Int).unwrap());
        let condition = doc.add_node(condition).unwrap();
        let bye = doc.add_node(text(&registry, TEXT_NODE_TYPE, "Bye")).unwrap();

        for link in [
            LinkRecord::new(start, NEXT_PORT, 0, hello),
            LinkRecord::new(hello, NEXT_PORT, 0, stay),
            LinkRecord::new(hello, NEXT_PORT, 0, leave),
            LinkRecord::new(leave, NEXT_PORT, 0, modifier),
            LinkRecord::new(modifier, NEXT_PORT, 0, condition),
            LinkRecord::new(condition, TRUE_PORT, 0, bye),
        ] {
            doc.connect(link, &registry, &validator).unwrap();
        }

        let persistence = GraphPersistence::new(Arc::new(registry), GraphSettings::default());
        persistence.save(&doc, path).unwrap();
    }

    fn run(command: Command) -> String {
        let mut out = Vec::new();
        Runner::new(GraphSettings::default()).run(command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_trace_follows_picks_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.ron");
        write_story(&path);

        let output = run(Command::Trace {
            path: path.clone(),
            picks: vec![1],
            max_steps: 100,
        });
        assert_eq!(output, "Hello\n  0) Stay\n  1) Leave\n  > 1\nBye\n[end]\n");

        let output = run(Command::Trace {
            path,
            picks: vec![],
            max_steps: 100,
        });
        assert!(output.ends_with("  > 0\n[end]\n"), "{output}");
    }

    #[test]
    fn test_trace_step_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.ron");
        write_story(&path);

        let output = run(Command::Trace {
            path,
            picks: vec![1],
            max_steps: 1,
        });
        assert!(output.ends_with("[stopped after 1 steps]\n"), "{output}");
    }

    #[test]
    fn test_new_check_convert() {
        let dir = tempfile::tempdir().unwrap();
        let ron_path = dir.path().join("tavern.ron");
        let json_path = dir.path().join("tavern.json");

        run(Command::New {
            path: ron_path.clone(),
            name: None,
        });
        let output = run(Command::Check { path: ron_path.clone() });
        assert_eq!(output, "tavern: 1 nodes, 0 links, 0 groups, 0 flags\n");

        run(Command::Convert {
            input: ron_path.clone(),
            output: json_path.clone(),
        });
        let output = run(Command::Check { path: json_path });
        assert_eq!(output, "tavern: 1 nodes, 0 links, 0 groups, 0 flags\n");

        let mut out = Vec::new();
        let err = Runner::new(GraphSettings::default())
            .run(
                Command::New {
                    path: ron_path,
                    name: None,
                },
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::AlreadyExists { .. }));
    }
}
