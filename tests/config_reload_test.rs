//! Configuration hot reload through filesystem notifications.
#![cfg(feature = "service")]

mod common;

use common::{create_config_dir, init_logging, write_file, PERSON_TYPE};
use degraphmalizer::{
    config::{ConfigurationProvider, HookRegistry, ReloadingConfiguration},
    event::{ConfigurationEvent, Event},
    watch::ConfigurationWatcher,
};
use std::{
    sync::{
        mpsc::{channel, Receiver},
        Arc,
    },
    time::{Duration, Instant},
};
use tempfile::TempDir;

fn wait_for(rx: &Receiver<Event>, mut matches: impl FnMut(&ConfigurationEvent) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(Event::Configuration(event)) if matches(&event) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[test]
fn edits_are_picked_up_and_bad_edits_rejected() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let config_dir = create_config_dir(&temp);
    let provider = Arc::new(
        ReloadingConfiguration::new(config_dir.clone(), HookRegistry::with_builtins()).unwrap(),
    );
    let (tx, rx) = channel();
    let _watcher =
        ConfigurationWatcher::with_debounce(provider.clone(), tx, Duration::from_millis(200))
            .unwrap();

    write_file(&config_dir, "family/pet.toml", PERSON_TYPE);
    let reloaded = wait_for(&rx, |event| {
        matches!(event, ConfigurationEvent::Reloaded(indices) if indices == &["family".to_string()])
            && provider.configuration().index("family").unwrap().type_config("pet").is_some()
    });
    assert!(reloaded, "new type file was not loaded");

    write_file(&config_dir, "family/broken.toml", "source_index = ");
    let rejected = wait_for(&rx, |event| matches!(event, ConfigurationEvent::Rejected(_)));
    assert!(rejected, "malformed type file was not rejected");

    let live = provider.configuration();
    let family = live.index("family").unwrap();
    assert!(family.type_config("pet").is_some());
    assert!(family.type_config("broken").is_none());
}
