/*!
Static HTML dashboard over an audit trail snapshot
*/

use std::fmt::Write;

use crate::graph::{COMPLIANT_COLOR, violation_color};
use crate::record::{AuditRecord, Violation};
use crate::stats::TrailStats;

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; background: #f3f4f6; margin: 0; }
header { background: #111827; color: white; padding: 20px; }
.cards { display: grid; grid-template-columns: repeat(5, 1fr); gap: 15px; margin: 20px; }
.card { background: white; border-radius: 10px; padding: 14px; text-align: center; box-shadow: 0 1px 3px rgba(0,0,0,0.2); }
.badge { color: white; padding: 3px 6px; border-radius: 6px; font-size: 0.75em; margin-right: 4px; }
button.filter { padding: 8px 12px; border-radius: 6px; border: none; margin-right: 8px; cursor: pointer; color: white; }
table { width: 96%; margin: 20px auto; background: white; border-collapse: collapse; }
th, td { padding: 8px; border-bottom: 1px solid #ddd; }
"#;

const SCRIPT: &str = r##"
function filterTable(tag) {
  var rows = document.querySelectorAll("#events tbody tr");
  rows.forEach(function (row) {
    var tags = row.getAttribute("data-alerts").split(" ");
    row.style.display = (tag === "all" || tags.indexOf(tag) >= 0) ? "" : "none";
  });
}
"##;

/// Render the dashboard page. `graph_href` is where the provenance graph was
/// written, linked from the page.
pub fn render_dashboard(records: &[AuditRecord], stats: &TrailStats, graph_href: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>IoT Security Auditing Dashboard</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str("<header><h1>IoT Security Auditing Dashboard</h1></header>\n");

    html.push_str("<div class=\"cards\">\n");
    card(&mut html, "Total", stats.total);
    card(&mut html, "OK", stats.compliant);
    card(&mut html, "Spoofing", stats.spoofing);
    card(&mut html, "Masking", stats.masking);
    card(&mut html, "TLS Violations", stats.tls_violation);
    html.push_str("</div>\n");

    html.push_str("<div style=\"margin-left:20px;\">\n");
    html.push_str("<button class=\"filter\" onclick=\"filterTable('all')\" style=\"background:#6366f1\">All</button>\n");
    let _ = writeln!(
        html,
        "<button class=\"filter\" onclick=\"filterTable('ok')\" style=\"background:{}\">OK</button>",
        COMPLIANT_COLOR
    );
    for violation in Violation::ALL {
        let _ = writeln!(
            html,
            "<button class=\"filter\" onclick=\"filterTable('{}')\" style=\"background:{}\">{}</button>",
            violation,
            violation_color(violation),
            violation
        );
    }
    html.push_str("</div>\n");

    html.push_str("<table id=\"events\">\n<thead><tr><th>ID</th><th>Device</th><th>Physical</th><th>Reported</th><th>Network</th><th>Alerts</th><th>TEE Time</th></tr></thead>\n<tbody>\n");
    for record in records {
        row(&mut html, record);
    }
    html.push_str("</tbody>\n</table>\n");

    let _ = writeln!(
        html,
        "<p style=\"margin-left:20px;\">Provenance graph: <a href=\"{0}\">{0}</a></p>",
        escape_html(graph_href)
    );
    html.push_str("<script>");
    html.push_str(SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

fn card(html: &mut String, title: &str, value: usize) {
    let _ = writeln!(html, "<div class=\"card\"><h3>{}</h3><p>{}</p></div>", title, value);
}

fn row(html: &mut String, record: &AuditRecord) {
    let (tags, badges) = if record.is_compliant() {
        (
            "ok".to_string(),
            format!("<span class=\"badge\" style=\"background:{}\">ok</span>", COMPLIANT_COLOR),
        )
    } else {
        let tags: Vec<&str> = record.alerts.iter().map(|v| v.as_str()).collect();
        let badges: String = record
            .alerts
            .iter()
            .map(|v| format!("<span class=\"badge\" style=\"background:{}\">{}</span>", violation_color(v), v))
            .collect();
        (tags.join(" "), badges)
    };

    let recorded_at = record
        .recorded_at()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let _ = writeln!(
        html,
        "<tr data-alerts=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
        tags,
        record.event_id,
        escape_html(&record.device),
        escape_html(&record.actual_state),
        escape_html(&record.reported_state),
        escape_html(&record.network_attempt),
        badges,
        recorded_at
    );
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
