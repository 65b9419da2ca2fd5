use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::Path;
use stocklens_core::agent::entity::{AssetSnapshot, Recommendation};
use stocklens_core::signal::entity::RecAction;

/// HTML 文本转义，理由文本可能来自 LLM。
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn action_class(action: RecAction) -> &'static str {
    match action {
        RecAction::Buy => "buy",
        RecAction::Sell => "sell",
        RecAction::Hold => "hold",
    }
}

/// # Summary
/// 渲染静态 HTML 看板：建议汇总表 + 每资产最新信号明细。
/// 输出是自包含的单文件，无外部资源依赖。
pub fn render(
    generated_at: DateTime<Utc>,
    recommendations: &[Recommendation],
    snapshots: &[AssetSnapshot],
) -> String {
    let mut html = String::new();
    html.push_str(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>StockLens Dashboard</title>\n<style>\n\
         body { font-family: -apple-system, 'Segoe UI', sans-serif; margin: 2rem; color: #1c1c1e; }\n\
         h1 { margin-bottom: 0.2rem; }\n\
         .meta { color: #6e6e73; margin-bottom: 1.5rem; }\n\
         table { border-collapse: collapse; width: 100%; margin-bottom: 2rem; }\n\
         th, td { text-align: left; padding: 0.5rem 0.75rem; border-bottom: 1px solid #e5e5ea; }\n\
         th { background: #f2f2f7; }\n\
         .badge { padding: 0.15rem 0.6rem; border-radius: 0.75rem; font-weight: 600; }\n\
         .buy { background: #d7f5dd; color: #1d7a36; }\n\
         .sell { background: #fddddd; color: #b3261e; }\n\
         .hold { background: #f0f0f3; color: #5b5b60; }\n\
         </style>\n</head>\n<body>\n",
    );

    html.push_str("<h1>StockLens</h1>\n");
    let _ = writeln!(
        html,
        "<p class=\"meta\">Generated at {}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    html.push_str("<h2>Recommendations</h2>\n");
    if recommendations.is_empty() {
        html.push_str("<p>No recommendations were produced in this run.</p>\n");
    } else {
        html.push_str(
            "<table>\n<tr><th>Symbol</th><th>Action</th><th>Price</th>\
             <th>Confidence</th><th>Rationale</th></tr>\n",
        );
        for rec in recommendations {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td><span class=\"badge {}\">{}</span></td>\
                 <td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&rec.symbol),
                action_class(rec.action),
                rec.action,
                rec.price.map_or("-".to_string(), |p| format!("{:.2}", p)),
                rec.confidence
                    .map_or("-".to_string(), |c| format!("{:.0}%", c * 100.0)),
                escape(&rec.rationale)
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("<h2>Latest signals</h2>\n");
    html.push_str(
        "<table>\n<tr><th>Symbol</th><th>Time</th><th>Close</th><th>RSI-14</th>\
         <th>MACD</th><th>Signal</th><th>ADX</th><th>Score</th><th>Rule</th></tr>\n",
    );
    for snapshot in snapshots {
        if let Some(row) = snapshot.latest() {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}</td>\
                 <td>{:.4}</td><td>{:.4}</td><td>{:.1}</td><td>{}</td>\
                 <td><span class=\"badge {}\">{}</span></td></tr>",
                escape(&snapshot.symbol),
                row.time.format("%Y-%m-%d %H:%M"),
                row.close,
                row.rsi_14,
                row.macd,
                row.macd_signal,
                row.adx,
                row.score,
                action_class(row.recommendation),
                row.recommendation
            );
        }
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// 将看板写入目标路径，必要时创建父目录。
pub fn write_report(path: impl AsRef<Path>, html: &str) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
}
