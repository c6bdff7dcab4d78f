// src/cli/status.rs — Model, skill and plugin status display

use crate::core::engine::Engine;
use crate::infra::paths;
use crate::patterns::miner::Pattern;

/// Display model and plugin status.
pub async fn show_status(engine: &mut Engine, json: bool) -> anyhow::Result<()> {
    let info = engine.get_model_info().await;
    let plugins = engine.get_plugin_status();

    if json {
        let value = serde_json::json!({ "model": info, "plugins": plugins });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("synapse v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }

    let db_path = paths::db_path();
    match std::fs::metadata(&db_path) {
        Ok(meta) => println!(
            "  Database:   {} ({})",
            db_path.display(),
            format_bytes(meta.len())
        ),
        Err(_) => println!("  Database:   (not initialized)"),
    }

    println!(
        "  Model:      {} ({:?})",
        info.model_type, info.status
    );
    println!(
        "  Vocabulary: {} tokens, {} contexts, codebook {}",
        info.vocab_size, info.context_count, info.codebook_size
    );
    println!("  Skills:     {}", info.skills_count);
    if let Some(model) = &info.trainable_model {
        println!(
            "  Learner:    {} ({}), buffer {:.0}%",
            model,
            if info.trainable_model_ready { "trained" } else { "untrained" },
            info.learner.buffer_utilization * 100.0
        );
    }

    println!("  Plugins:    {}", plugins.plugin_count);
    for p in &plugins.plugins {
        println!("    - {} {}", p.id, p.details);
    }
    Ok(())
}

/// List learned skills.
pub async fn show_skills(engine: &mut Engine, json: bool) -> anyhow::Result<()> {
    let skills = engine.get_skills().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
        return Ok(());
    }
    if skills.is_empty() {
        println!("No skills learned yet.");
        return Ok(());
    }
    for line in skill_lines(&skills) {
        println!("{line}");
    }
    Ok(())
}

fn skill_lines(skills: &[Pattern]) -> Vec<String> {
    let mut sorted: Vec<&Pattern> = skills.iter().collect();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.name.cmp(&b.name)));
    sorted
        .iter()
        .map(|p| format!("{:>4}x  {:.2}  {}", p.frequency, p.confidence, p.name))
        .collect()
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}
