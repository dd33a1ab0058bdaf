//! `lily sessions`: Saved chat management.

use lily_core::message::Role;
use lily_core::session::SessionStore;
use lily_memory::FileSessionStore;

fn open_store() -> Result<FileSessionStore, Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    Ok(FileSessionStore::open(FileSessionStore::default_path(
        &config.data_dir(),
    )))
}

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let sessions = store.list().await?;

    println!("💬 Saved Chats");
    println!("==============");
    if sessions.is_empty() {
        println!("  No saved chats yet. Start one with `lily chat`.");
        return Ok(());
    }

    for session in &sessions {
        println!(
            "  {}  {:<34} {:>4} msgs  {}  {}",
            session.id,
            super::truncate(&session.title, 34),
            session.messages.len(),
            session.last_used.format("%Y-%m-%d %H:%M"),
            session.model_id,
        );
    }
    Ok(())
}

pub async fn show(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let session = store
        .get(id)
        .await?
        .ok_or_else(|| format!("No chat with id '{id}'"))?;

    println!("💬 {}", session.title);
    println!("   id: {}  model: {}", session.id, session.model_id);
    println!(
        "   last used: {}",
        session.last_used.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    for message in &session.messages {
        let label = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        for (i, line) in message.content.lines().enumerate() {
            if i == 0 {
                println!("  {label:>9} > {line}");
            } else {
                println!("              {line}");
            }
        }
        for image in &message.images {
            println!("              [image] {image}");
        }
        for line in &message.memory_log {
            println!("              · {line}");
        }
    }
    Ok(())
}

pub async fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    if store.delete(id).await? {
        println!("🗑️  Deleted chat {id}");
        Ok(())
    } else {
        Err(format!("No chat with id '{id}'").into())
    }
}
