//! On-disk persistence for aliases, mode parameters, and filter graphs.
//!
//! Loads are all-or-nothing: a malformed file leaves the in-memory state
//! untouched. Saves go through a temp file that replaces the destination
//! only after every byte has been written.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use scanline_core::prelude::{
    ColorParams, GeometryParams, ModeParams, Resolution, ResolutionAlias,
};
use scanline_filter::{FilterGraph, FilterKind, FilterNode, NodeId, PARAM_BLOB_LEN};

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn parse_err(path: &Path, detail: impl Into<String>) -> DiskError {
    DiskError::Parse {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

/// Write `contents` to `<path>.tmp`, remove any previous `path`, and move
/// the temp file into place.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), DiskError> {
    let mut tmp_name = OsString::from(path.as_os_str());
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let write_err = |source| DiskError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, contents).map_err(write_err)?;
    if path.exists() {
        if let Err(source) = fs::remove_file(path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(source));
        }
    }
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(source));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, DiskError> {
    fs::read_to_string(path).map_err(|source| DiskError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Aliases: one `from_w,from_h,to_w,to_h,` record per line, trailing comma
// significant.

pub fn save_aliases(path: &Path, aliases: &[ResolutionAlias]) -> Result<(), DiskError> {
    let mut out = String::new();
    for a in aliases {
        out.push_str(&format!("{},{},{},{},\n", a.from.w, a.from.h, a.to.w, a.to.h));
    }
    atomic_write(path, out.as_bytes())?;
    info!(count = aliases.len(), ?path, "saved aliases");
    Ok(())
}

pub fn load_aliases(path: &Path) -> Result<Vec<ResolutionAlias>, DiskError> {
    let contents = read_file(path)?;
    let mut aliases = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split(',').collect();
        // Four values plus the empty field after the trailing comma.
        if fields.len() != 5 || !fields[4].is_empty() {
            return Err(parse_err(
                path,
                format!("line {}: expected four comma-terminated fields", idx + 1),
            ));
        }
        let mut values = [0u32; 4];
        for (slot, field) in values.iter_mut().zip(&fields[..4]) {
            *slot = field
                .parse::<u32>()
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| {
                    parse_err(path, format!("line {}: '{field}' is not a positive integer", idx + 1))
                })?;
        }
        aliases.push(ResolutionAlias {
            from: Resolution::new(values[0], values[1], 0),
            to: Resolution::new(values[2], values[3], 0),
        });
    }
    info!(count = aliases.len(), ?path, "loaded aliases");
    Ok(aliases)
}

// ---------------------------------------------------------------------------
// Mode parameters: blocks separated by blank lines, each `resolution,W,H`
// followed by exactly these keys in this order.

const MODE_PARAM_KEYS: [&str; 13] = [
    "vPos", "hPos", "hScale", "phase", "bLevel", "bright", "contr", "redBr", "redCn", "greenBr",
    "greenCn", "blueBr", "blueCn",
];

pub fn save_mode_params(path: &Path, modes: &[ModeParams]) -> Result<(), DiskError> {
    let mut out = String::new();
    for m in modes {
        out.push_str(&format!("resolution,{},{}\n", m.resolution.w, m.resolution.h));
        let values = mode_param_values(m);
        for (key, value) in MODE_PARAM_KEYS.iter().zip(values) {
            out.push_str(&format!("{key},{value}\n"));
        }
        out.push('\n');
    }
    atomic_write(path, out.as_bytes())?;
    info!(count = modes.len(), ?path, "saved mode parameter sets");
    Ok(())
}

fn mode_param_values(m: &ModeParams) -> [i32; 13] {
    [
        m.geometry.ver_pos,
        m.geometry.hor_pos,
        m.geometry.hor_scale,
        m.geometry.phase,
        m.geometry.black_level,
        m.color.bright,
        m.color.contr,
        m.color.red_bright,
        m.color.red_contr,
        m.color.green_bright,
        m.color.green_contr,
        m.color.blue_bright,
        m.color.blue_contr,
    ]
}

pub fn load_mode_params(path: &Path) -> Result<Vec<ModeParams>, DiskError> {
    let contents = read_file(path)?;
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let mut modes = Vec::new();
    while let Some((idx, header)) = lines.next() {
        let fields: Vec<&str> = header.split(',').collect();
        if fields.len() != 3 || fields[0] != "resolution" {
            return Err(parse_err(
                path,
                format!("line {}: expected a 'resolution,W,H' block header", idx + 1),
            ));
        }
        let w = fields[1]
            .parse::<u32>()
            .map_err(|_| parse_err(path, format!("line {}: bad width", idx + 1)))?;
        let h = fields[2]
            .parse::<u32>()
            .map_err(|_| parse_err(path, format!("line {}: bad height", idx + 1)))?;

        let mut values = [0i32; 13];
        for (key, value) in MODE_PARAM_KEYS.iter().zip(values.iter_mut()) {
            let Some((idx, line)) = lines.next() else {
                return Err(parse_err(path, format!("missing '{key}' entry")));
            };
            let (name, number) = line
                .split_once(',')
                .ok_or_else(|| parse_err(path, format!("line {}: expected 'key,value'", idx + 1)))?;
            if name != *key {
                return Err(parse_err(
                    path,
                    format!("line {}: expected '{key}' but got '{name}'", idx + 1),
                ));
            }
            *value = number
                .parse::<i32>()
                .map_err(|_| parse_err(path, format!("line {}: bad '{key}' value", idx + 1)))?;
        }

        modes.push(ModeParams {
            resolution: Resolution::new(w, h, 0),
            geometry: GeometryParams {
                ver_pos: values[0],
                hor_pos: values[1],
                hor_scale: values[2],
                phase: values[3],
                black_level: values[4],
            },
            color: ColorParams {
                bright: values[5],
                contr: values[6],
                red_bright: values[7],
                red_contr: values[8],
                green_bright: values[9],
                green_contr: values[10],
                blue_bright: values[11],
                blue_contr: values[12],
            },
        });
    }
    info!(count = modes.len(), ?path, "loaded mode parameter sets");
    Ok(modes)
}

// ---------------------------------------------------------------------------
// Filter graph: JSON that round-trips nodes, parameter blobs, edges, and
// editor positions.

#[derive(Serialize, Deserialize)]
struct GraphFile {
    enabled: bool,
    nodes: Vec<GraphFileNode>,
}

#[derive(Serialize, Deserialize)]
struct GraphFileNode {
    id: u32,
    filter: String,
    params: Vec<u8>,
    position: (f32, f32),
    edges: Vec<u32>,
}

pub fn save_filter_graph(path: &Path, graph: &FilterGraph) -> Result<(), DiskError> {
    let file = GraphFile {
        enabled: graph.is_enabled(),
        nodes: graph
            .nodes()
            .map(|node| GraphFileNode {
                id: node.id.0,
                filter: node.kind.name().to_string(),
                params: node.params.to_vec(),
                position: node.position,
                edges: node.edges.iter().map(|id| id.0).collect(),
            })
            .collect(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| DiskError::Write {
        path: path.to_path_buf(),
        source: io::Error::other(e),
    })?;
    atomic_write(path, &json)?;
    info!(nodes = graph.node_count(), ?path, "saved filter graph");
    Ok(())
}

pub fn load_filter_graph(path: &Path) -> Result<FilterGraph, DiskError> {
    let contents = read_file(path)?;
    let file: GraphFile = serde_json::from_str(&contents)
        .map_err(|e| parse_err(path, e.to_string()))?;

    let mut graph = FilterGraph::new();
    graph.set_enabled(file.enabled);
    for node in &file.nodes {
        let kind = FilterKind::from_name(&node.filter)
            .map_err(|e| parse_err(path, e.to_string()))?;
        if node.params.len() != PARAM_BLOB_LEN {
            return Err(parse_err(
                path,
                format!("node {}: parameter blob must be {PARAM_BLOB_LEN} bytes", node.id),
            ));
        }
        let mut params = [0u8; PARAM_BLOB_LEN];
        params.copy_from_slice(&node.params);
        graph.insert_node(FilterNode {
            id: NodeId(node.id),
            kind,
            params,
            edges: node.edges.iter().map(|&id| NodeId(id)).collect(),
            position: node.position,
        });
    }
    let report = graph.rebuild_chains();
    info!(
        nodes = graph.node_count(),
        chains = report.chains,
        ?path,
        "loaded filter graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_path(name: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("scanline-disk-{}-{}-{}", std::process::id(), n, name))
    }

    fn alias(fw: u32, fh: u32, tw: u32, th: u32) -> ResolutionAlias {
        ResolutionAlias {
            from: Resolution::new(fw, fh, 0),
            to: Resolution::new(tw, th, 0),
        }
    }

    #[test]
    fn aliases_round_trip() {
        let path = temp_path("aliases.csv");
        let aliases = vec![alias(640, 400, 1280, 800), alias(800, 600, 1024, 768)];
        save_aliases(&path, &aliases).unwrap();
        assert_eq!(load_aliases(&path).unwrap(), aliases);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn alias_rows_require_the_trailing_comma() {
        let path = temp_path("aliases-bad.csv");
        fs::write(&path, "640,400,1280,800\n").unwrap();
        assert!(matches!(load_aliases(&path), Err(DiskError::Parse { .. })));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_alias_row_loads_nothing() {
        let path = temp_path("aliases-partial.csv");
        fs::write(&path, "640,400,1280,800,\nzero,0,1,1,\n").unwrap();
        assert!(load_aliases(&path).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mode_params_round_trip_all_fields() {
        let path = temp_path("modes.csv");
        let mode = ModeParams {
            resolution: Resolution::new(1280, 1024, 0),
            color: ColorParams {
                bright: 1,
                contr: 2,
                red_bright: 3,
                red_contr: 4,
                green_bright: 5,
                green_contr: 6,
                blue_bright: 7,
                blue_contr: 8,
            },
            geometry: GeometryParams {
                phase: 9,
                black_level: 10,
                hor_pos: 11,
                ver_pos: 12,
                hor_scale: 13,
            },
        };
        save_mode_params(&path, &[mode]).unwrap();
        let loaded = load_mode_params(&path).unwrap();
        assert_eq!(loaded, vec![mode]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mode_params_reject_reordered_keys() {
        let path = temp_path("modes-bad.csv");
        let text = "resolution,640,480\nhPos,1\nvPos,2\nhScale,3\nphase,4\nbLevel,5\n\
                    bright,6\ncontr,7\nredBr,8\nredCn,9\ngreenBr,10\ngreenCn,11\nblueBr,12\nblueCn,13\n";
        fs::write(&path, text).unwrap();
        assert!(matches!(load_mode_params(&path), Err(DiskError::Parse { .. })));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn filter_graph_round_trips_nodes_edges_and_blobs() {
        let path = temp_path("graph.json");
        let mut graph = FilterGraph::new();
        graph.set_enabled(true);
        let input = graph.add_node(FilterKind::InputGate);
        let mut blur_params = FilterKind::Blur.default_params();
        blur_params[0] = 42;
        let blur = graph.add_node_at(FilterKind::Blur, blur_params, (120.5, -3.0));
        let output = graph.add_node(FilterKind::OutputGate);
        graph.connect(input, blur);
        graph.connect(blur, output);
        graph.rebuild_chains();

        save_filter_graph(&path, &graph).unwrap();
        let loaded = load_filter_graph(&path).unwrap();

        assert!(loaded.is_enabled());
        assert_eq!(loaded.node_count(), 3);
        let loaded_blur = loaded.node(blur).unwrap();
        assert_eq!(loaded_blur.kind, FilterKind::Blur);
        assert_eq!(loaded_blur.params[0], 42);
        assert_eq!(loaded_blur.position, (120.5, -3.0));
        assert_eq!(loaded.chains().len(), 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_filter_name_aborts_the_graph_load() {
        let path = temp_path("graph-bad.json");
        fs::write(
            &path,
            r#"{"enabled":false,"nodes":[{"id":0,"filter":"Emboss","params":[],"position":[0,0],"edges":[]}]}"#,
        )
        .unwrap();
        assert!(matches!(load_filter_graph(&path), Err(DiskError::Parse { .. })));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn save_replaces_an_existing_file_atomically() {
        let path = temp_path("aliases-replace.csv");
        save_aliases(&path, &[alias(1, 1, 2, 2)]).unwrap();
        save_aliases(&path, &[alias(3, 3, 4, 4)]).unwrap();
        let loaded = load_aliases(&path).unwrap();
        assert_eq!(loaded, vec![alias(3, 3, 4, 4)]);
        // No temp file is left behind.
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        assert!(!Path::new(&tmp).exists());
        fs::remove_file(&path).unwrap();
    }
}
