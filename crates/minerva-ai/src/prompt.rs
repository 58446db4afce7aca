use minerva_model::{SummaryLevel, SymbolRecord};
use minerva_store::GraphStore;

/// Upper bound on direct-callee summaries folded into a prompt.
const MAX_DEPENDENCY_SUMMARIES: usize = 5;

/// Build the summarisation prompt for one symbol: its shape (kind, FQN,
/// signature, annotations, framework attributes) plus the summaries of its
/// direct callees when they are already available.
pub fn assemble_prompt(store: &GraphStore, symbol: &SymbolRecord) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(&format!(
        "Summarise the following Java {} in one or two sentences, \
         focusing on its business purpose.\n\n",
        symbol.kind.as_str()
    ));
    prompt.push_str(&format!("FQN: {}\n", symbol.fqn));
    if let Some(signature) = &symbol.signature {
        prompt.push_str(&format!("Signature: {signature}\n"));
    }
    if !symbol.modifiers.is_empty() {
        prompt.push_str(&format!("Modifiers: {}\n", symbol.modifiers.join(" ")));
    }
    if !symbol.annotations.is_empty() {
        prompt.push_str(&format!("Annotations: {}\n", symbol.annotations.join(", ")));
    }
    if !symbol.attributes.is_empty() {
        prompt.push_str(&format!("Framework attributes: {}\n", symbol.attributes.to_json()));
    }

    // Dependency summaries give the model downstream context; absent ones are
    // simply omitted (staleness propagation will refresh this symbol again
    // when they land).
    let mut dependency_lines: Vec<String> = Vec::new();
    if let Ok(edges) = store.edges_from(&symbol.fqn) {
        for edge in edges {
            if dependency_lines.len() >= MAX_DEPENDENCY_SUMMARIES {
                break;
            }
            if edge.relation != minerva_model::EdgeRelation::Calls {
                continue;
            }
            for level in [SummaryLevel::Method, SummaryLevel::Class] {
                if let Ok(Some(summary)) = store.get_summary(&edge.to_fqn, level) {
                    if !summary.is_stale {
                        dependency_lines.push(format!("- {}: {}", edge.to_fqn, summary.summary));
                        break;
                    }
                }
            }
        }
    }
    if !dependency_lines.is_empty() {
        prompt.push_str("\nIt calls:\n");
        for line in &dependency_lines {
            prompt.push_str(line);
            prompt.push('\n');
        }
    }

    prompt
}
