//! Scoped front-face winding inversion.
//!
//! Reflected renders flip handedness, so they must run with winding
//! inverted. The flag is global to the renderer and must never leak into
//! unrelated draws: [`InvertedWinding`] holds the renderer exclusively while
//! the flag is set and restores the previous value when dropped, including
//! on early returns.

use std::ops::{Deref, DerefMut};

use crate::backend::SceneRenderer;

/// Exclusive access to a renderer with winding inverted.
pub struct InvertedWinding<'a, R: SceneRenderer + ?Sized> {
    renderer: &'a mut R,
    previous: bool,
}

impl<'a, R: SceneRenderer + ?Sized> InvertedWinding<'a, R> {
    /// Inverts winding on `renderer` until the guard is dropped.
    pub fn acquire(renderer: &'a mut R) -> Self {
        let previous = renderer.winding_inverted();
        renderer.set_winding_inverted(true);
        Self { renderer, previous }
    }
}

impl<R: SceneRenderer + ?Sized> Deref for InvertedWinding<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.renderer
    }
}

impl<R: SceneRenderer + ?Sized> DerefMut for InvertedWinding<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.renderer
    }
}

impl<R: SceneRenderer + ?Sized> Drop for InvertedWinding<'_, R> {
    fn drop(&mut self) {
        self.renderer.set_winding_inverted(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureHandle;
    use crate::error::{RenderError, RenderResult};
    use speculum_core::{CameraId, ReflectedState};

    #[derive(Default)]
    struct FlagRenderer {
        inverted: bool,
        seen_during_render: Vec<bool>,
        fail: bool,
    }

    impl SceneRenderer for FlagRenderer {
        fn create_camera(&mut self, _label: &str) -> CameraId {
            CameraId::new(1)
        }

        fn release_camera(&mut self, _camera: CameraId) {}

        fn winding_inverted(&self) -> bool {
            self.inverted
        }

        fn set_winding_inverted(&mut self, inverted: bool) {
            self.inverted = inverted;
        }

        fn render(
            &mut self,
            _camera: CameraId,
            _state: &ReflectedState,
            _target: TextureHandle,
        ) -> RenderResult<()> {
            self.seen_during_render.push(self.inverted);
            if self.fail {
                Err(RenderError::OutOfMemory)
            } else {
                Ok(())
            }
        }
    }

    fn state() -> ReflectedState {
        ReflectedState {
            eye: None,
            pose: speculum_core::Pose::IDENTITY,
            fov: 1.0,
            near: 0.1,
            far: 10.0,
            projection: glam::Mat4::IDENTITY,
        }
    }

    fn render_scoped(renderer: &mut FlagRenderer) -> RenderResult<()> {
        let mut scope = InvertedWinding::acquire(renderer);
        scope.render(CameraId::new(1), &state(), TextureHandle::from_raw(1))?;
        Ok(())
    }

    #[test]
    fn test_flag_set_only_inside_scope() {
        let mut renderer = FlagRenderer::default();
        render_scoped(&mut renderer).unwrap();
        assert_eq!(renderer.seen_during_render, vec![true]);
        assert!(!renderer.inverted);
    }

    #[test]
    fn test_flag_restored_on_error() {
        let mut renderer = FlagRenderer {
            fail: true,
            ..FlagRenderer::default()
        };
        assert!(render_scoped(&mut renderer).is_err());
        assert!(!renderer.inverted);
    }

    #[test]
    fn test_nested_scope_restores_outer_value() {
        let mut renderer = FlagRenderer::default();
        {
            let mut outer = InvertedWinding::acquire(&mut renderer);
            {
                let inner = InvertedWinding::acquire(&mut *outer);
                assert!(inner.winding_inverted());
            }
            assert!(outer.winding_inverted());
        }
        assert!(!renderer.winding_inverted());
    }
}
