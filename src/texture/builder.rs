// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Builder pattern for texture creation to reduce parameter count.

use super::{
    CreateFlags, MultisampleType, Pool, ResourceType, SubResourceData, Texture, TextureDesc, Usage,
};
use crate::device::Context;
use crate::error::Error;
use crate::pixel_formats::FormatId;

/// Builder for creating textures with a cleaner API than [`Texture::create`].
///
/// Defaults: one level, no usage flags, the default pool, no multisampling, no initial data.
#[derive(Debug, Clone)]
pub struct TextureBuilder<'a> {
    desc: TextureDesc,
    level_count: u32,
    flags: CreateFlags,
    data: Option<&'a [SubResourceData<'a>]>,
}

impl<'a> TextureBuilder<'a> {
    fn new(resource_type: ResourceType, format: FormatId, width: u32, height: u32, depth: u32) -> Self {
        Self {
            desc: TextureDesc {
                resource_type,
                format,
                multisample_type: MultisampleType::None,
                multisample_quality: 0,
                usage: Usage::empty(),
                pool: Pool::Default,
                width,
                height,
                depth,
            },
            level_count: 1,
            flags: CreateFlags::empty(),
            data: None,
        }
    }

    /// A 2D texture.
    pub fn new_2d(format: FormatId, width: u32, height: u32) -> Self {
        Self::new(ResourceType::Texture2d, format, width, height, 1)
    }

    /// A volume texture.
    pub fn new_3d(format: FormatId, width: u32, height: u32, depth: u32) -> Self {
        Self::new(ResourceType::Texture3d, format, width, height, depth)
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.desc.usage = usage;
        self
    }

    pub fn pool(mut self, pool: Pool) -> Self {
        self.desc.pool = pool;
        self
    }

    /// Set the number of mip levels.
    pub fn levels(mut self, level_count: u32) -> Self {
        self.level_count = level_count;
        self
    }

    pub fn flags(mut self, flags: CreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn multisample(mut self, multisample_type: MultisampleType, quality: u32) -> Self {
        self.desc.multisample_type = multisample_type;
        self.desc.multisample_quality = quality;
        self
    }

    /// Initial contents, one entry per sub-resource in index order.
    pub fn data(mut self, data: &'a [SubResourceData<'a>]) -> Self {
        self.data = Some(data);
        self
    }

    /// Get the description built so far.
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Get the level count.
    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn build(self, context: &mut Context<'_>) -> Result<Texture, Error> {
        Texture::create(context, &self.desc, self.level_count, self.flags, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 3, 5).levels(2);
        assert_eq!(builder.desc().depth, 1);
        assert_eq!(builder.desc().pool, Pool::Default);
        assert_eq!(builder.level_count(), 2);
        let volume = TextureBuilder::new_3d(FormatId::B8G8R8A8Unorm, 3, 5, 7).pool(Pool::Scratch);
        assert_eq!(volume.desc().resource_type, ResourceType::Texture3d);
        assert_eq!(volume.desc().pool, Pool::Scratch);
    }
}
