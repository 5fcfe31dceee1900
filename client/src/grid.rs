//! The shared placement cursor and the reservation that guards it.
//!
//! Building and relocating both drive the same cursor, so only one of them
//! may hold it at a time. A reservation is tied to the token of the actor
//! that opened it and is never reclaimed on a timer; it stays held until the
//! holder ends it or the session is torn down with [`GridArbiter::force_release`].

use log::debug;
use shared::Vec3;

/// Cursor height above the ground plane.
const CURSOR_HEIGHT: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridOwner {
    #[default]
    None,
    Build,
    Move,
}

/// Opaque identity of whoever asks for the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorToken(pub u32);

/// Obstacle test used to decide whether a grid cell is free.
pub trait ObstacleProbe {
    fn is_blocked(&self, center: Vec3, half_extent: f32) -> bool;
}

#[derive(Debug)]
pub struct GridArbiter {
    owner: GridOwner,
    holder: Option<ActorToken>,
    grid_size: f32,
    cursor_active: bool,
    cursor_locked: bool,
    cursor_position: Option<Vec3>,
    buildable: bool,
}

impl GridArbiter {
    pub fn new(grid_size: f32) -> Self {
        Self {
            owner: GridOwner::None,
            holder: None,
            grid_size,
            cursor_active: false,
            cursor_locked: true,
            cursor_position: None,
            buildable: false,
        }
    }

    /// Grants the cursor to `token` for `kind`. Succeeds when the cursor is
    /// free or already held by the same kind and token.
    pub fn begin_reservation(&mut self, kind: GridOwner, token: ActorToken) -> bool {
        if kind == GridOwner::None {
            return false;
        }
        match self.owner {
            GridOwner::None => {}
            current if current == kind && self.holder == Some(token) => return true,
            current => {
                debug!("Grid busy with {:?}, denying {:?} for {:?}", current, kind, token);
                return false;
            }
        }
        self.owner = kind;
        self.holder = Some(token);
        self.cursor_active = true;
        self.cursor_locked = false;
        true
    }

    /// Releases the cursor if `token` holds it. Any other caller is ignored.
    pub fn end_reservation(&mut self, token: ActorToken) -> bool {
        if self.owner == GridOwner::None || self.holder != Some(token) {
            debug!("Ignoring grid release from non-holder {:?}", token);
            return false;
        }
        self.release();
        true
    }

    /// Drops any reservation regardless of holder. Used on teardown.
    pub fn force_release(&mut self) {
        if self.owner != GridOwner::None {
            debug!("Force releasing grid held by {:?}", self.holder);
        }
        self.release();
    }

    fn release(&mut self) {
        self.owner = GridOwner::None;
        self.holder = None;
        self.cursor_active = false;
        self.cursor_locked = true;
        self.buildable = false;
    }

    pub fn owner(&self) -> GridOwner {
        self.owner
    }

    pub fn holder(&self) -> Option<ActorToken> {
        self.holder
    }

    pub fn is_busy(&self) -> bool {
        self.owner != GridOwner::None
    }

    pub fn is_owned_by(&self, kind: GridOwner, token: ActorToken) -> bool {
        self.owner == kind && self.holder == Some(token)
    }

    pub fn is_cursor_active(&self) -> bool {
        self.cursor_active
    }

    pub fn is_cursor_locked(&self) -> bool {
        self.cursor_locked
    }

    pub fn lock_cursor(&mut self) {
        self.cursor_locked = true;
    }

    pub fn unlock_cursor(&mut self) {
        if self.cursor_active {
            self.cursor_locked = false;
        }
    }

    /// Re-evaluates the cursor from the latest pointer hit. Called every tick.
    pub fn update_cursor(&mut self, hit: Option<Vec3>, probe: &dyn ObstacleProbe) {
        if !self.cursor_active || self.cursor_locked {
            self.buildable = false;
            return;
        }
        match hit {
            Some(point) => {
                let mut aligned = point.align_to_grid(self.grid_size);
                aligned.y = CURSOR_HEIGHT;
                self.cursor_position = Some(aligned);
                self.buildable = !probe.is_blocked(aligned.flat(), self.grid_size * 0.5);
            }
            None => {
                self.cursor_position = None;
                self.buildable = false;
            }
        }
    }

    pub fn is_buildable_position(&self) -> bool {
        self.buildable
    }

    pub fn cursor_position(&self) -> Option<Vec3> {
        self.cursor_position
    }
}
