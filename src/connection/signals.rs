use std::fmt;
use std::sync::{Arc, Mutex};

use crate::message::Message;

/// The match key of a signal subscription.
///
/// A subscription matches an inbound signal when the interface and member
/// are equal and, if a sender is given, the sender matches too.
#[derive(Debug, Clone)]
pub struct SignalMatch {
    pub(crate) interface: Box<str>,
    pub(crate) member: Box<str>,
    pub(crate) sender: Option<Box<str>>,
}

impl SignalMatch {
    /// Match signals by interface and member.
    pub fn new(interface: &str, member: &str) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
            sender: None,
        }
    }

    /// Additionally require the given sender.
    #[must_use]
    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.into());
        self
    }

    fn matches(&self, message: &Message) -> bool {
        if message.interface() != Some(&*self.interface) {
            return false;
        }

        if message.member() != Some(&*self.member) {
            return false;
        }

        match &self.sender {
            Some(sender) => message.sender() == Some(&**sender),
            None => true,
        }
    }

    /// The bus match rule equivalent to this subscription.
    pub(crate) fn rule(&self) -> String {
        let mut rule = format!(
            "type='signal',interface='{}',member='{}'",
            self.interface, self.member
        );

        if let Some(sender) = &self.sender {
            rule.push_str(",sender='");
            rule.push_str(sender);
            rule.push('\'');
        }

        rule
    }
}

type SignalHandler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Subscription {
    id: u64,
    key: SignalMatch,
    handler: SignalHandler,
}

/// The set of local signal subscriptions of a connection.
pub(crate) struct Subscriptions {
    inner: Mutex<SubscriptionState>,
}

struct SubscriptionState {
    next_id: u64,
    entries: Vec<Subscription>,
}

impl Subscriptions {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SubscriptionState {
                next_id: 1,
                entries: Vec::new(),
            }),
        }
    }

    pub(crate) fn insert<F>(&self, key: SignalMatch, handler: F) -> u64
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;

        inner.entries.push(Subscription {
            id,
            key,
            handler: Arc::new(handler),
        });

        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.inner.lock().unwrap().entries.retain(|s| s.id != id);
    }

    /// Fan a signal out to every matching subscription.
    ///
    /// Handlers run outside the subscription lock, so a handler may freely
    /// subscribe or unsubscribe.
    pub(crate) fn dispatch(&self, message: &Message) {
        let handlers = {
            let inner = self.inner.lock().unwrap();

            inner
                .entries
                .iter()
                .filter(|s| s.key.matches(message))
                .map(|s| s.handler.clone())
                .collect::<Vec<_>>()
        };

        for handler in handlers {
            handler(message);
        }
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Subscriptions")
            .field("len", &inner.entries.len())
            .finish()
    }
}
