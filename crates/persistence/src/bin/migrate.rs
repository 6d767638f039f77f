#![deny(warnings)]

//! Rewrites a save file in the current snapshot format, filling fields that
//! older saves did not carry.

use anyhow::{bail, Context};
use persistence::{load_snapshot, write_snapshot, FileStore, DEFAULT_SAVE_KEY};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "./saves".to_string());
    let key = args.next().unwrap_or_else(|| DEFAULT_SAVE_KEY.to_string());

    let mut store = FileStore::new(&dir);
    let Some(snapshot) = load_snapshot(&store, &key)
        .with_context(|| format!("reading save {key} in {dir}"))?
    else {
        bail!("no save {key} in {dir}");
    };
    write_snapshot(&mut store, &key, &snapshot)
        .with_context(|| format!("writing save {key} in {dir}"))?;
    println!(
        "Migrated {} | upgrades: {} | sound: {}",
        store.path_for(&key)?.display(),
        snapshot.upgrade_levels.len(),
        snapshot.sound_enabled
    );
    Ok(())
}
