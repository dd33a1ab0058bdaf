//! `lily memory`: Memory index management commands.

use lily_config::AppConfig;
use lily_core::memory::SimilarityIndex;
use lily_memory::FileIndex;
use std::path::PathBuf;

fn open_index(config: &AppConfig) -> (FileIndex, PathBuf) {
    let path = FileIndex::default_path(&config.data_dir());
    (FileIndex::open(path.clone()), path)
}

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let (index, path) = open_index(&config);
    let entries = index.list().await?;

    println!("🧠 Memory Statistics");
    println!("====================");
    println!("  Enabled:    {}", config.memory.enabled);
    println!("  Embeddings: {}", config.memory.embedding_model);
    println!(
        "  Retrieval:  top {} at similarity ≥ {:.2}",
        config.memory.max_results, config.memory.similarity_threshold
    );
    println!("  Entries:    {}", entries.len());
    if let Some(first) = entries.first() {
        println!("  Dimension:  {}", first.embedding.len());
    }

    // Show index file info
    if path.exists() {
        let meta = std::fs::metadata(&path)?;
        let size_kb = meta.len() as f64 / 1024.0;
        println!("  Index file: {} ({:.1} KB)", path.display(), size_kb);
    } else {
        println!("  Index file: (not created yet)");
    }

    Ok(())
}

pub async fn list(chat: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let (index, _) = open_index(&super::load_config()?);
    let entries: Vec<_> = index
        .list()
        .await?
        .into_iter()
        .filter(|e| chat.is_none_or(|c| e.chat_id == c))
        .collect();

    if entries.is_empty() {
        println!("   No memories stored.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "  {}  {:<9} {}  [{}] {}",
            entry.id,
            entry.role.to_string(),
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.chat_id,
            super::truncate(&entry.content, 60),
        );
    }
    println!();
    println!("  {} memories", entries.len());
    Ok(())
}

pub async fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (index, _) = open_index(&super::load_config()?);
    if index.delete(id).await? {
        println!("🗑️  Deleted memory {id}");
        Ok(())
    } else {
        Err(format!("No memory with id '{id}'").into())
    }
}

pub async fn clear() -> Result<(), Box<dyn std::error::Error>> {
    let (index, _) = open_index(&super::load_config()?);
    let count = index.count().await?;
    index.clear().await?;
    println!("🧹 Cleared {count} memories");
    Ok(())
}
