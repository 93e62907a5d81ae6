mod library;
mod player;
mod reservations;

pub use library::{SoundLibrary, SoundRequest};
pub(crate) use library::is_wav;
pub use player::{CommandPlayer, Playback, PlaybackEnd, SoundPlayer};
pub use reservations::{ClipReservation, ClipReservations};
