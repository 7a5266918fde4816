use crate::taxonomy::{Taxonomy, DEFAULT_CODE};
use crate::{ObiError, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

struct RawNode {
    id: String,
    parent: String,
    rank: String,
}

/// Inserts `nodes` parents first, starting from the node that is its own
/// parent.
fn build_tree(
    name: &str,
    code: &str,
    nodes: Vec<RawNode>,
    names: FxHashMap<String, String>,
    aliases: Vec<(String, String)>,
) -> Result<Taxonomy> {
    let mut children: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    let mut roots = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.id == node.parent {
            roots.push(i);
        } else {
            children.entry(node.parent.as_str()).or_default().push(i);
        }
    }
    let root = match roots.as_slice() {
        [root] => *root,
        [] => return Err(ObiError::Taxonomy(format!("{}: no root node", name))),
        _ => {
            return Err(ObiError::Taxonomy(format!(
                "{}: {} root nodes found",
                name,
                roots.len()
            )))
        }
    };

    let mut taxonomy = Taxonomy::new(name, code);
    let mut queue = VecDeque::from([root]);
    let mut inserted = 0usize;
    while let Some(i) = queue.pop_front() {
        let node = &nodes[i];
        taxonomy.add_taxon(&node.id, &node.parent, &node.rank, i == root, true)?;
        if let Some(name) = names.get(&node.id) {
            taxonomy.set_scientific_name(&node.id, name.clone())?;
        }
        inserted += 1;
        if let Some(kids) = children.get(node.id.as_str()) {
            queue.extend(kids.iter().copied());
        }
    }
    if inserted < nodes.len() {
        warn!(
            "{}: {} nodes are not connected to the root and were ignored",
            name,
            nodes.len() - inserted
        );
    }

    let mut skipped = 0usize;
    for (alias, target) in &aliases {
        if taxonomy.add_alias(alias, target).is_err() {
            skipped += 1;
        }
    }
    if skipped > 0 {
        debug!("{}: {} aliases skipped", name, skipped);
    }

    info!(
        "Loaded taxonomy {} with {} nodes and {} aliases",
        name,
        taxonomy.len(),
        aliases.len() - skipped
    );
    Ok(taxonomy)
}

fn dump_fields(line: &str) -> Vec<&str> {
    line.trim_end_matches(['\n', '\r'])
        .trim_end_matches("\t|")
        .split("\t|\t")
        .map(str::trim)
        .collect()
}

fn read_dump(path: &Path) -> Result<Vec<Vec<String>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(dump_fields(&line).into_iter().map(String::from).collect());
    }
    Ok(rows)
}

/// Loads an NCBI taxdump directory: `nodes.dmp`, `names.dmp` and, when
/// present, `merged.dmp`.
pub fn load_ncbi_dump(dir: &Path) -> Result<Taxonomy> {
    let nodes_path = dir.join("nodes.dmp");
    let names_path = dir.join("names.dmp");
    if !nodes_path.exists() || !names_path.exists() {
        return Err(ObiError::Taxonomy(format!(
            "{} is not an NCBI taxdump directory",
            dir.display()
        )));
    }

    let mut nodes = Vec::new();
    for (line, fields) in read_dump(&nodes_path)?.into_iter().enumerate() {
        if fields.len() < 3 {
            return Err(ObiError::Taxonomy(format!(
                "nodes.dmp line {}: expected at least 3 fields",
                line + 1
            )));
        }
        let mut fields = fields.into_iter();
        let (Some(id), Some(parent), Some(rank)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        nodes.push(RawNode { id, parent, rank });
    }

    let mut names = FxHashMap::default();
    for fields in read_dump(&names_path)? {
        if fields.len() >= 4 && fields[3] == "scientific name" {
            names.insert(fields[0].clone(), fields[1].clone());
        }
    }

    let merged_path = dir.join("merged.dmp");
    let aliases = if merged_path.exists() {
        read_dump(&merged_path)?
            .into_iter()
            .filter(|f| f.len() >= 2)
            .map(|f| (f[0].clone(), f[1].clone()))
            .collect()
    } else {
        Vec::new()
    };

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ncbi".to_string());
    build_tree(&name, DEFAULT_CODE, nodes, names, aliases)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    taxid: String,
    parent: String,
    taxonomic_rank: String,
    #[serde(default)]
    scientific_name: Option<String>,
}

/// Loads a CSV taxonomy with columns
/// `taxid,parent,taxonomic_rank,scientific_name`.
///
/// Identifiers may carry a `code:` prefix; the first one seen names the
/// taxonomy code.
pub fn load_csv(path: &Path) -> Result<Taxonomy> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut nodes = Vec::new();
    let mut names = FxHashMap::default();
    let mut code: Option<String> = None;

    for row in reader.deserialize() {
        let row: CsvRow = row?;
        let (row_code, id) = split_code(&row.taxid);
        if code.is_none() {
            code = row_code.map(String::from);
        }
        let id = id.to_string();
        let parent = split_code(&row.parent).1.to_string();
        if let Some(name) = row.scientific_name.filter(|n| !n.is_empty()) {
            names.insert(id.clone(), name);
        }
        nodes.push(RawNode {
            id,
            parent,
            rank: row.taxonomic_rank,
        });
    }

    let name = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "taxonomy".to_string());
    let code = code.unwrap_or_else(|| DEFAULT_CODE.to_string());
    build_tree(&name, &code, nodes, names, Vec::new())
}

/// Splits `code:raw [name]@rank` into its code and raw identifier.
fn split_code(id: &str) -> (Option<&str>, &str) {
    let id = id.split(['[', '@']).next().unwrap_or(id).trim();
    match id.split_once(':') {
        Some((code, raw)) => (Some(code), raw),
        None => (None, id),
    }
}

/// Loads a taxdump directory or a CSV file.
pub fn load_taxonomy(path: &Path) -> Result<Taxonomy> {
    if path.is_dir() {
        load_ncbi_dump(path)
    } else if path.is_file() {
        load_csv(path)
    } else {
        Err(ObiError::Taxonomy(format!("taxonomy {} not found", path.display())))
    }
}
