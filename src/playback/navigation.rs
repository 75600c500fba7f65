use crate::playback::events::NavigationDirection;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub type NavigationCallback = Arc<dyn Fn() + Send + Sync>;

/// Previous/next context supplied by the lesson sequencing layer.
/// The player never builds a playlist itself.
#[derive(Clone, Default)]
pub struct NavigationContext {
    pub has_previous: bool,
    pub has_next: bool,
    pub on_previous: Option<NavigationCallback>,
    pub on_next: Option<NavigationCallback>,
}

impl NavigationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_previous(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.has_previous = true;
        self.on_previous = Some(Arc::new(callback));
        self
    }

    pub fn with_next(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.has_next = true;
        self.on_next = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for NavigationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationContext")
            .field("has_previous", &self.has_previous)
            .field("has_next", &self.has_next)
            .field("on_previous", &self.on_previous.is_some())
            .field("on_next", &self.on_next.is_some())
            .finish()
    }
}

/// Routes prev/next requests to the supplied callbacks
#[derive(Debug, Default)]
pub struct NavigationCoordinator {
    context: NavigationContext,
}

impl NavigationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_context(&mut self, context: NavigationContext) {
        debug!("Navigation context updated: {:?}", context);
        self.context = context;
    }

    pub fn can_go(&self, direction: NavigationDirection) -> bool {
        match direction {
            NavigationDirection::Previous => {
                self.context.has_previous && self.context.on_previous.is_some()
            }
            NavigationDirection::Next => self.context.has_next && self.context.on_next.is_some(),
        }
    }

    /// Invoke the callback for `direction`. Returns false when that direction is unavailable.
    pub fn navigate(&self, direction: NavigationDirection) -> bool {
        if !self.can_go(direction) {
            debug!("Navigation {:?} unavailable", direction);
            return false;
        }

        let callback = match direction {
            NavigationDirection::Previous => &self.context.on_previous,
            NavigationDirection::Next => &self.context.on_next,
        };
        if let Some(callback) = callback {
            info!("Navigating {:?}", direction);
            callback();
        }
        true
    }

    /// A skip gesture at the edge of the timeline becomes track navigation:
    /// backward within `edge` seconds of the start, forward within `edge` of the end.
    pub fn edge_direction(
        &self,
        delta: f64,
        current_time: f64,
        duration: f64,
        edge: f64,
    ) -> Option<NavigationDirection> {
        if delta < 0.0 && current_time <= edge && self.can_go(NavigationDirection::Previous) {
            Some(NavigationDirection::Previous)
        } else if delta > 0.0
            && duration > 0.0
            && duration - current_time <= edge
            && self.can_go(NavigationDirection::Next)
        {
            Some(NavigationDirection::Next)
        } else {
            None
        }
    }
}
