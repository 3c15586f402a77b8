use std::ops::{Deref, DerefMut};

use crate::host::HostDriver;
use crate::units::{RulerUnit, TypeUnit};

/// Measurement preferences shared by every open document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Preferences {
    pub ruler_units: RulerUnit,
    pub type_units: TypeUnit,
}

impl Preferences {
    /// Working units used while drawing marks.
    pub const WORKING: Preferences = Preferences {
        ruler_units: RulerUnit::Pixels,
        type_units: TypeUnit::Points,
    };

    pub fn capture<H: HostDriver + ?Sized>(host: &H) -> Self {
        Self {
            ruler_units: host.ruler_units(),
            type_units: host.type_units(),
        }
    }

    pub fn apply<H: HostDriver + ?Sized>(&self, host: &mut H) {
        host.set_ruler_units(self.ruler_units);
        host.set_type_units(self.type_units);
    }
}

/// Applies working units to a host and puts the original ones back when
/// dropped, whichever way the scope is left.
///
/// The scope derefs to the host, so driver calls go through it.
pub struct UnitScope<'a, H: HostDriver + ?Sized> {
    host: &'a mut H,
    saved: Preferences,
}

impl<'a, H: HostDriver + ?Sized> UnitScope<'a, H> {
    pub fn enter(host: &'a mut H, working: Preferences) -> Self {
        let saved = Preferences::capture(&*host);
        working.apply(&mut *host);
        tracing::debug!(?saved, ?working, "entered unit scope");
        Self { host, saved }
    }

    /// Preferences that will be restored.
    pub fn saved(&self) -> Preferences {
        self.saved
    }
}

impl<H: HostDriver + ?Sized> Deref for UnitScope<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: HostDriver + ?Sized> DerefMut for UnitScope<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: HostDriver + ?Sized> Drop for UnitScope<'_, H> {
    fn drop(&mut self) {
        self.saved.apply(&mut *self.host);
        tracing::debug!(restored = ?self.saved, "left unit scope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SizeMarksApp;

    #[test]
    fn scope_applies_working_units_and_restores() {
        let mut app = SizeMarksApp::default();
        app.set_ruler_units(RulerUnit::Centimeters);
        app.set_type_units(TypeUnit::Pixels);

        {
            let scope = UnitScope::enter(&mut app, Preferences::WORKING);
            assert_eq!(scope.ruler_units(), RulerUnit::Pixels);
            assert_eq!(scope.type_units(), TypeUnit::Points);
            assert_eq!(scope.saved().ruler_units, RulerUnit::Centimeters);
        }

        assert_eq!(app.ruler_units(), RulerUnit::Centimeters);
        assert_eq!(app.type_units(), TypeUnit::Pixels);
    }

    #[test]
    fn scope_restores_on_early_return() {
        fn fails(app: &mut SizeMarksApp) -> Result<(), &'static str> {
            let mut scope = UnitScope::enter(app, Preferences::WORKING);
            scope.set_ruler_units(RulerUnit::Picas);
            Err("boom")
        }

        let mut app = SizeMarksApp::default();
        app.set_ruler_units(RulerUnit::Inches);
        assert!(fails(&mut app).is_err());
        assert_eq!(app.ruler_units(), RulerUnit::Inches);
    }
}
