/// `marshal/handle.rs`: type-tagged userdata cells for native resources
///
/// A handle embeds the native struct by value. The cell storage is an enum,
/// so one userdata type fits every resource and the tag always agrees with
/// the payload. The native library keeps ownership of whatever the struct
/// points at: dropping a cell (Lua GC) reclaims nothing, only `release`
/// runs the matching unload.
use std::fmt;

use mlua::{AnyUserData, Lua, MetaMethod, Result as LuaResult, UserData, UserDataFields, UserDataMethods};

use crate::{
    error::BindError,
    marshal::values::{Camera2D, Camera3D},
    native::{
        types::{
            AudioStream, Cubemap, Font, GlyphInfo, Image, Material, Mesh, Model, ModelAnimation,
            Music, RenderTexture, Sound, Texture, Wave,
        },
        NativeLibrary,
    },
};

/// A native struct that can live inside a handle cell.
pub trait NativeResource: Copy + 'static {
    const TAG: HandleTag;

    fn into_slot(self) -> HandleSlot;

    fn slot_mut(slot: &mut HandleSlot) -> Option<&mut Self>;

    /// Run the native unload that matches this resource type.
    fn unload(self, lib: &NativeLibrary);
}

macro_rules! handle_types {
    ($($tag:ident => $ty:ty, |$lib:ident, $res:ident| $unload:expr;)+) => {
        /// Runtime type descriptor attached to every handle cell.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum HandleTag {
            $($tag),+
        }

        impl HandleTag {
            pub fn name(self) -> &'static str {
                match self {
                    $(HandleTag::$tag => stringify!($tag)),+
                }
            }
        }

        /// Storage for one embedded native struct; sized for the largest.
        #[derive(Debug, Clone, Copy)]
        pub enum HandleSlot {
            $($tag($ty)),+
        }

        impl HandleSlot {
            pub fn tag(&self) -> HandleTag {
                match self {
                    $(HandleSlot::$tag(_) => HandleTag::$tag),+
                }
            }
        }

        $(
            impl NativeResource for $ty {
                const TAG: HandleTag = HandleTag::$tag;

                fn into_slot(self) -> HandleSlot {
                    HandleSlot::$tag(self)
                }

                fn slot_mut(slot: &mut HandleSlot) -> Option<&mut Self> {
                    match slot {
                        HandleSlot::$tag(value) => Some(value),
                        _ => None,
                    }
                }

                #[allow(clippy::unused_unit)]
                fn unload(self, $lib: &NativeLibrary) {
                    let $res = self;
                    $unload
                }
            }
        )+
    };
}

handle_types! {
    Image => Image, |lib, res| lib.unload_image(res);
    Texture => Texture, |lib, res| lib.unload_texture(res);
    Cubemap => Cubemap, |lib, res| lib.unload_texture(res.0);
    RenderTexture => RenderTexture, |lib, res| lib.unload_render_texture(res);
    Font => Font, |lib, res| lib.unload_font(res);
    // Glyphs returned by GetGlyphInfo share the font's storage.
    GlyphInfo => GlyphInfo, |_lib, _res| ();
    Mesh => Mesh, |lib, res| lib.unload_mesh(res);
    Material => Material, |lib, res| lib.unload_material(res);
    Model => Model, |lib, res| lib.unload_model(res);
    ModelAnimation => ModelAnimation, |lib, res| lib.unload_model_animation(res);
    Wave => Wave, |lib, res| lib.unload_wave(res);
    Sound => Sound, |lib, res| lib.unload_sound(res);
    Music => Music, |lib, res| lib.unload_music_stream(res);
    AudioStream => AudioStream, |lib, res| lib.unload_audio_stream(res);
    Camera2D => Camera2D, |_lib, _res| ();
    Camera3D => Camera3D, |_lib, _res| ();
}

impl fmt::Display for HandleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Cell ──────────────────────────────────────────────────────────────────────

pub struct HandleCell {
    slot: HandleSlot,
    #[cfg(debug_assertions)]
    released: bool,
}

// SAFETY: the raw pointers inside the embedded structs are owned by the
// native library and are never dereferenced through the cell. The cell is
// only a carrier for the struct bytes between bound calls.
unsafe impl Send for HandleCell {}

impl HandleCell {
    pub fn new<T: NativeResource>(value: T) -> Self {
        Self {
            slot: value.into_slot(),
            #[cfg(debug_assertions)]
            released: false,
        }
    }

    pub fn tag(&self) -> HandleTag {
        self.slot.tag()
    }

    /// Resolve the embedded struct as `T`, checking the tag first.
    fn resolve<T: NativeResource>(&mut self) -> Result<&mut T, BindError> {
        let actual = self.slot.tag();
        #[cfg(debug_assertions)]
        let released = self.released;
        let value = T::slot_mut(&mut self.slot)
            .ok_or(BindError::TypeMismatch { expected: T::TAG, actual })?;
        #[cfg(debug_assertions)]
        if released {
            return Err(BindError::UseAfterRelease { tag: actual });
        }
        Ok(value)
    }

    fn mark_released(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.released = true;
        }
    }
}

impl UserData for HandleCell {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("tag", |_, this| Ok(this.tag().name()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("{}: {:p}", this.tag(), this))
        });
    }
}

// ── Lifecycle operations ──────────────────────────────────────────────────────

/// Move `value` into a new Lua-managed handle cell.
pub fn wrap<T: NativeResource>(lua: &Lua, value: T) -> LuaResult<AnyUserData> {
    lua.create_userdata(HandleCell::new(value))
}

/// Run `f` against the embedded struct. Mutations persist in the cell, which
/// is what in/out native calls (resize, crop, ...) rely on.
pub fn with_handle<T: NativeResource, R>(
    ud: &AnyUserData,
    f: impl FnOnce(&mut T) -> R,
) -> Result<R, BindError> {
    let mut cell = ud.borrow_mut::<HandleCell>().map_err(|_| BindError::NotAHandle {
        expected: T::TAG,
        got: "userdata".to_string(),
    })?;
    cell.resolve::<T>().map(f)
}

/// Copy the embedded struct out of the cell.
pub fn unwrap<T: NativeResource>(ud: &AnyUserData) -> Result<T, BindError> {
    with_handle(ud, |value: &mut T| *value)
}

/// Tag of a handle cell, `None` for any other userdata.
pub fn tag_of(ud: &AnyUserData) -> Option<HandleTag> {
    ud.borrow::<HandleCell>().ok().map(|cell| cell.tag())
}

/// Unload the embedded resource and invalidate the cell.
///
/// Calling this twice for the same resource is a caller error, exactly as
/// unloading twice is in the native library.
pub fn release<T: NativeResource>(lib: &NativeLibrary, ud: &AnyUserData) -> Result<(), BindError> {
    let mut cell = ud.borrow_mut::<HandleCell>().map_err(|_| BindError::NotAHandle {
        expected: T::TAG,
        got: "userdata".to_string(),
    })?;
    let value = *cell.resolve::<T>()?;
    value.unload(lib);
    cell.mark_released();
    log::debug!("released {} handle", T::TAG);
    Ok(())
}
