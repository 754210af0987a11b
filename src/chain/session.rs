use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::watch;

/// Connected account and chain id, with change notification.
#[derive(Clone)]
pub struct Session {
    account: Arc<watch::Sender<Option<Address>>>,
    chain_id: Arc<watch::Sender<u64>>,
}

impl Session {
    pub fn new(account: Option<Address>, chain_id: u64) -> Self {
        let (account, _) = watch::channel(account);
        let (chain_id, _) = watch::channel(chain_id);
        Self {
            account: Arc::new(account),
            chain_id: Arc::new(chain_id),
        }
    }

    pub fn account(&self) -> Option<Address> {
        *self.account.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.account().is_some()
    }

    pub fn chain_id(&self) -> u64 {
        *self.chain_id.borrow()
    }

    /// Switch account; subscribers are woken only on an actual change.
    pub fn set_account(&self, account: Option<Address>) {
        self.account.send_if_modified(|current| {
            if *current == account {
                return false;
            }
            *current = account;
            true
        });
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.send_if_modified(|current| {
            if *current == chain_id {
                return false;
            }
            *current = chain_id;
            true
        });
    }

    pub fn subscribe_account(&self) -> watch::Receiver<Option<Address>> {
        self.account.subscribe()
    }

    pub fn subscribe_chain_id(&self) -> watch::Receiver<u64> {
        self.chain_id.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn account_change_notifies_subscribers() {
        let session = Session::new(None, 1);
        let mut rx = session.subscribe_account();
        assert!(!session.is_connected());

        let user = Address::repeat_byte(0x11);
        session.set_account(Some(user));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(user));

        // same value again is not a change
        session.set_account(Some(user));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn clones_share_state() {
        let session = Session::new(None, 1);
        let other = session.clone();
        other.set_chain_id(11_155_111);
        assert_eq!(session.chain_id(), 11_155_111);
    }
}
