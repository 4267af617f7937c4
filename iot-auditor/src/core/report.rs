/*!
Static dashboard rendering over a finished (or still growing) audit trail
*/

use std::path::{Path, PathBuf};

use iot_audit_trail::{ProvenanceGraph, TrailError, TrailStats, load_trail, render_dashboard};
use tracing::{info, warn};

use crate::core::error::AuditorError;

pub const DASHBOARD_FILE: &str = "dashboard.html";
pub const GRAPH_FILE: &str = "provenance.dot";

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub stats: TrailStats,
    pub skipped_lines: usize,
    pub dashboard: PathBuf,
    pub graph: PathBuf,
}

/// Read the trail and write `dashboard.html` and `provenance.dot` into `out_dir`
pub fn generate_report(trail: &Path, out_dir: &Path) -> Result<ReportSummary, AuditorError> {
    let snapshot = load_trail(trail)?;
    if snapshot.skipped_lines > 0 {
        warn!("Skipped {} unparsable trail lines", snapshot.skipped_lines);
    }
    let stats = TrailStats::from_records(&snapshot.records);

    std::fs::create_dir_all(out_dir).map_err(|source| TrailError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    info!("Building provenance graph...");
    let graph = ProvenanceGraph::from_records(&snapshot.records);
    let graph_path = out_dir.join(GRAPH_FILE);
    write(&graph_path, &graph.to_dot())?;

    info!("Building dashboard...");
    let dashboard_path = out_dir.join(DASHBOARD_FILE);
    write(&dashboard_path, &render_dashboard(&snapshot.records, &stats, GRAPH_FILE))?;

    info!("Dashboard generated: {:?}", dashboard_path);
    Ok(ReportSummary {
        stats,
        skipped_lines: snapshot.skipped_lines,
        dashboard: dashboard_path,
        graph: graph_path,
    })
}

fn write(path: &Path, content: &str) -> Result<(), TrailError> {
    std::fs::write(path, content).map_err(|source| TrailError::Write {
        path: path.to_path_buf(),
        source,
    })
}
