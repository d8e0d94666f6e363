//! Event kinds and host callback shapes.
//!
//! DAQmx has two native callback signatures. On the host side they are
//! modelled as one tagged union, [`EventCallback`], so a registration always
//! carries exactly one callback of a known shape.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::status::Status;
use crate::task::TaskHandle;

/// Opaque host payload handed back to callbacks.
///
/// The caller keeps ownership; a registration only holds a cross-boundary
/// handle to it while the native subscription is active.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Kind of native event a registration subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Task finished or stopped because of an error.
    TaskDone,
    /// N samples were acquired into the input buffer (read side).
    EveryNSamplesAcquired,
    /// N samples were transferred from the output buffer (write side).
    EveryNSamplesTransferred,
}

impl EventKind {
    /// Native `everyNsamplesEventType` value, or `None` for [`EventKind::TaskDone`].
    pub fn every_n_samples_type(self) -> Option<i32> {
        match self {
            Self::TaskDone => None,
            Self::EveryNSamplesAcquired => Some(daqmx_sys::DAQmx_Val_Acquired_Into_Buffer as i32),
            Self::EveryNSamplesTransferred => {
                Some(daqmx_sys::DAQmx_Val_Transferred_From_Buffer as i32)
            }
        }
    }

    /// Convert a native `everyNsamplesEventType` value.
    pub fn from_every_n_samples_type(raw: i32) -> Option<Self> {
        if raw == daqmx_sys::DAQmx_Val_Acquired_Into_Buffer as i32 {
            Some(Self::EveryNSamplesAcquired)
        } else if raw == daqmx_sys::DAQmx_Val_Transferred_From_Buffer as i32 {
            Some(Self::EveryNSamplesTransferred)
        } else {
            None
        }
    }

    /// Check if this kind carries a sample threshold.
    pub fn is_every_n_samples(self) -> bool {
        !matches!(self, Self::TaskDone)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskDone => write!(f, "TaskDone"),
            Self::EveryNSamplesAcquired => write!(f, "EveryNSamplesAcquired"),
            Self::EveryNSamplesTransferred => write!(f, "EveryNSamplesTransferred"),
        }
    }
}

/// Arguments of a task-done notification.
#[derive(Clone, Copy)]
pub struct DoneEvent<'a> {
    /// Task that finished.
    pub task: TaskHandle,
    /// Status the task finished with.
    pub status: Status,
    /// User data supplied at registration, if any.
    pub user_data: Option<&'a UserData>,
}

/// Arguments of an every-N-samples notification.
#[derive(Clone, Copy)]
pub struct SamplesEvent<'a> {
    /// Task that raised the event.
    pub task: TaskHandle,
    /// Whether samples were acquired or transferred.
    pub kind: EventKind,
    /// Sample count reported by the driver.
    pub n_samples: u32,
    /// User data supplied at registration, if any.
    pub user_data: Option<&'a UserData>,
}

impl DoneEvent<'_> {
    /// Downcast the user data to a concrete type.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.and_then(|d| d.downcast_ref::<T>())
    }
}

impl SamplesEvent<'_> {
    /// Downcast the user data to a concrete type.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.and_then(|d| d.downcast_ref::<T>())
    }
}

/// Host callback for task-done events.
pub type DoneCallback = Arc<dyn Fn(&DoneEvent<'_>) -> i32 + Send + Sync>;

/// Host callback for every-N-samples events.
pub type EveryNSamplesCallback = Arc<dyn Fn(&SamplesEvent<'_>) -> i32 + Send + Sync>;

/// A host callback of one of the two native shapes.
#[derive(Clone)]
pub enum EventCallback {
    /// `(task, status, data)` shape.
    Done(DoneCallback),
    /// `(task, event_type, n_samples, data)` shape.
    EveryNSamples(EveryNSamplesCallback),
}

impl EventCallback {
    /// Wrap a closure as a task-done callback.
    pub fn done<F>(f: F) -> Self
    where
        F: Fn(&DoneEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        Self::Done(Arc::new(f))
    }

    /// Wrap a closure as an every-N-samples callback.
    pub fn every_n_samples<F>(f: F) -> Self
    where
        F: Fn(&SamplesEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        Self::EveryNSamples(Arc::new(f))
    }

    /// Check if this callback has the shape `kind` is delivered with.
    pub fn matches(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::Done(_), EventKind::TaskDone)
                | (Self::EveryNSamples(_), EventKind::EveryNSamplesAcquired)
                | (Self::EveryNSamples(_), EventKind::EveryNSamplesTransferred)
        )
    }

    /// Name of the callback shape, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Done(_) => "done",
            Self::EveryNSamples(_) => "every-N-samples",
        }
    }
}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventCallback::{}", self.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_n_samples_type_roundtrip() {
        assert_eq!(EventKind::TaskDone.every_n_samples_type(), None);
        assert_eq!(EventKind::EveryNSamplesAcquired.every_n_samples_type(), Some(1));
        assert_eq!(EventKind::EveryNSamplesTransferred.every_n_samples_type(), Some(2));
        assert_eq!(
            EventKind::from_every_n_samples_type(1),
            Some(EventKind::EveryNSamplesAcquired)
        );
        assert_eq!(
            EventKind::from_every_n_samples_type(2),
            Some(EventKind::EveryNSamplesTransferred)
        );
        assert_eq!(EventKind::from_every_n_samples_type(0), None);
    }

    #[test]
    fn test_callback_matches_kind() {
        let done = EventCallback::done(|_| 0);
        let samples = EventCallback::every_n_samples(|_| 0);

        assert!(done.matches(EventKind::TaskDone));
        assert!(!done.matches(EventKind::EveryNSamplesAcquired));
        assert!(!samples.matches(EventKind::TaskDone));
        assert!(samples.matches(EventKind::EveryNSamplesAcquired));
        assert!(samples.matches(EventKind::EveryNSamplesTransferred));
    }

    #[test]
    fn test_user_data_downcast() {
        let data: UserData = Arc::new(String::from("channel-a"));
        let event = DoneEvent {
            task: TaskHandle::null(),
            status: Status::OK,
            user_data: Some(&data),
        };
        assert_eq!(event.user_data::<String>().map(String::as_str), Some("channel-a"));
        assert!(event.user_data::<u32>().is_none());

        let empty = SamplesEvent {
            task: TaskHandle::null(),
            kind: EventKind::EveryNSamplesAcquired,
            n_samples: 10,
            user_data: None,
        };
        assert!(empty.user_data::<String>().is_none());
    }
}
