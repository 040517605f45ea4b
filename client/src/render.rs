use shared::{DetectionRecord, DetectionResult, DetectionSession, DetectionView};

pub fn render_session(session: &DetectionSession, source: &str) -> String {
    match session.view() {
        DetectionView::Idle => "No image submitted.\n".to_string(),
        DetectionView::Analyzing => format!("Analyzing {source}... / വിശകലനം ചെയ്യുന്നു...\n"),
        DetectionView::Complete(result) => {
            let mut out = format!("[{source}] Analysis Complete\n");
            render_result(&mut out, result);
            out
        }
        DetectionView::Error(message) => {
            let mut out = format!("[{source}] {message}\n");
            if let Some(fallback) = session.displayed_result() {
                render_result(&mut out, &fallback);
            }
            out
        }
    }
}

fn render_result(out: &mut String, result: &DetectionResult) {
    out.push_str(&format!("  Disease:    {} ({})\n", result.disease, result.malayalam_label));
    out.push_str(&format!("  Confidence: {}%\n", result.confidence));
    out.push_str(&format!("  Severity:   {}\n", result.severity));
    out.push_str(&format!("  Urgency:    {}\n", result.urgency));
    out.push_str(&format!("  Treatment:  {}\n", result.treatment));
    out.push_str(&format!("  ചികിത്സ:    {}\n", result.malayalam_treatment));
    if !result.prevention_tips.is_empty() {
        out.push_str("  Prevention:\n");
        for tip in &result.prevention_tips {
            out.push_str(&format!("    - {}\n", tip));
        }
    }
}

pub fn render_history(user_id: &str, records: &[DetectionRecord]) -> String {
    if records.is_empty() {
        return format!("No detections recorded for {user_id}.\n");
    }
    let mut out = format!("{} detection(s) for {}:\n", records.len(), user_id);
    for record in records {
        out.push_str(&format!(
            "  {}  {} ({})  {}%  {}  [{}]\n",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.result.disease,
            record.result.malayalam_label,
            record.result.confidence,
            record.result.severity,
            record.image_path,
        ));
    }
    out
}
