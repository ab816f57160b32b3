// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! texture_coherency keeps the copies of a texture synchronized.

A texture's sub-resources (one per mip level and layer) can live in several places at once:

| Location       | What it is                                              |
|----------------|---------------------------------------------------------|
| `SYSMEM`       | Host memory owned by the engine                         |
| `USER_MEMORY`  | Host memory owned by the caller                         |
| `DIB`          | A bitmap lent to legacy drawing code                    |
| `TEXTURE_RGB`  | The native texture, sampled linearly                    |
| `TEXTURE_SRGB` | The native texture with gamma decoding, when separate   |

Each sub-resource tracks which of these are current. Writing one location makes the others
stale; asking for a stale location brings it current from the cheapest valid source, converting
formats on the way if the device needs a substitute format. Native copies additionally track
which regions are dirty, so small writes upload small regions.

# Backends

Native textures are reached through the [`imp::Driver`] trait. [`imp::soft::SoftDriver`]
keeps them in host memory and counts every call, which makes it suitable headless and in tests.
With the `backend_wgpu` feature, `imp::wgpu::WgpuDriver` stores them in wgpu.

# Threading

A [`device::Device`] has one context. Every operation that moves texture data takes
`&mut device::Context`, the lease on that context, so only one thread moves data at a time.
Reference counts are atomic and can be changed from anywhere.

```
use texture_coherency::device::{Capabilities, Device, DeviceConfig};
use texture_coherency::imp::soft::SoftDriver;
use texture_coherency::pixel_formats::FormatId;
use texture_coherency::texture::{Location, TextureBuilder};

let device = Device::new(Box::new(SoftDriver::new(Capabilities::default())), DeviceConfig::default());
let mut context = device.acquire_context();
let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 2, 2).build(&mut context).unwrap();
texture.update_region(&mut context, 0, None, &[0xff; 16], 8, 16).unwrap();
assert_eq!(texture.location_flags(&mut context, 0).unwrap(), Location::SYSMEM);
texture.load(&mut context, false).unwrap();
assert!(texture.location_flags(&mut context, 0).unwrap().contains(Location::TEXTURE_RGB));
```
*/

pub mod coordinates;
pub mod device;
mod error;
pub mod imp;
pub mod pixel_formats;
pub mod sampler;
pub mod texture;

pub use error::Error;
