pub mod db;
pub mod db_objects;

use crate::cfg::Settings;
use db::CampusDb;
use std::sync::Arc;
use tokio::sync::broadcast::{channel, Receiver, Sender};

#[derive(Clone)]
pub struct CampusState {
    db: CampusDb,
    settings: Arc<Settings>,
    stop_sender: Sender<()>,
}

impl CampusState {
    pub fn new(db: CampusDb, settings: Settings) -> Self {
        let (stop_sender, _) = channel(1);

        Self {
            db,
            settings: Arc::new(settings),
            stop_sender,
        }
    }

    pub fn db(&self) -> &CampusDb {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stop_receiver(&self) -> Receiver<()> {
        self.stop_sender.subscribe()
    }

    pub fn send_stop_msg(&self) {
        //no receivers just means nothing is running in the background
        if let Err(e) = self.stop_sender.send(()) {
            warn!(?e, "No background tasks to stop");
        }
    }
}
