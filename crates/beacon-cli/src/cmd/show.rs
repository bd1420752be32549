//! `bcn show`: every open of one identifier, newest first.

use std::io::Write;
use std::path::Path;

use beacon_core::report::{self, IdentifierDetail, Lookups};
use clap::Args;

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Identifier to inspect (exact match).
    pub identifier: String,
}

/// Execute `bcn show`.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let cfg = super::load_config(output, project_root)?;
    let store = super::open_existing_store(output, project_root)?;
    let geo = cfg.location_lookup(project_root);
    let lookups = Lookups {
        location: &geo,
        zones: &cfg.display.zones,
    };

    let detail = report::identifier_detail(&store, &args.identifier, lookups);
    render_mode(output, &detail, render_detail_text, render_detail_pretty)?;
    super::ensure_query_ok(output, &detail.status)
}

fn render_detail_text(detail: &IdentifierDetail, w: &mut dyn Write) -> std::io::Result<()> {
    for open in &detail.opens {
        let times: Vec<&str> = open.local_times.iter().map(|t| t.time.as_str()).collect();
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            times.join("\t"),
            open.origin,
            open.descriptor,
            open.location
        )?;
    }
    Ok(())
}

fn render_detail_pretty(detail: &IdentifierDetail, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &detail.identifier)?;
    pretty_kv(w, "Campaign", detail.campaign.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "Recipient", detail.recipient.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "Opens", detail.opens.len().to_string())?;

    for open in &detail.opens {
        writeln!(w)?;
        for time in &open.local_times {
            pretty_kv(w, &time.zone, &time.time)?;
        }
        pretty_kv(w, "Origin", &open.origin)?;
        pretty_kv(w, "Client", &open.descriptor)?;
        pretty_kv(w, "Location", open.location.to_string())?;
        if open.via_proxy {
            pretty_kv(w, "Note", "fetched by an image proxy, origin is the proxy")?;
        }
    }
    if !detail.opens.is_empty() {
        pretty_rule(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::geo::Location;
    use beacon_core::report::{OpenDetail, QueryStatus, ZonedTime};
    use chrono::{TimeZone, Utc};

    fn sample() -> IdentifierDetail {
        IdentifierDetail {
            identifier: "camp1-a@x".into(),
            campaign: Some("camp1".into()),
            recipient: Some("a@x".into()),
            opens: vec![OpenDetail {
                occurred_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("ts"),
                local_times: vec![
                    ZonedTime {
                        zone: "Beijing".into(),
                        time: "2025-01-02 11:04:05".into(),
                    },
                    ZonedTime {
                        zone: "US Eastern".into(),
                        time: "2025-01-01 22:04:05".into(),
                    },
                ],
                origin: "203.0.113.7".into(),
                agent: "curl/8.4.0".into(),
                descriptor: "Automated (curl)".into(),
                location: Location::Unknown,
                via_proxy: false,
            }],
            status: QueryStatus::Ok,
        }
    }

    #[test]
    fn text_rows_carry_every_zone() {
        let mut buf = Vec::new();
        render_detail_text(&sample(), &mut buf).expect("render");
        let s = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            s,
            "2025-01-02 11:04:05\t2025-01-01 22:04:05\t203.0.113.7\tAutomated (curl)\tUnknown\n"
        );
    }

    #[test]
    fn pretty_shows_identifier_parts() {
        let mut buf = Vec::new();
        render_detail_pretty(&sample(), &mut buf).expect("render");
        let s = String::from_utf8(buf).expect("utf8");
        assert!(s.contains("Campaign:    camp1"));
        assert!(s.contains("Beijing:     2025-01-02 11:04:05"));
        assert!(s.contains("Location:    Unknown"));
        assert!(!s.contains("image proxy"));
    }

    #[test]
    fn pretty_flags_proxy_opens() {
        let mut detail = sample();
        detail.opens[0].via_proxy = true;
        let mut buf = Vec::new();
        render_detail_pretty(&detail, &mut buf).expect("render");
        let s = String::from_utf8(buf).expect("utf8");
        assert!(s.contains("Note:        fetched by an image proxy"));
    }
}
