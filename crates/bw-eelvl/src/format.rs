use bw_protocol::{CodecResult, Packet};

/// The subset of an `.eelvl` header this port actually keeps. The
/// reference's header also carries `gravity`, `bgcolor`, `description`,
/// `campaign`, crew identity and a minimap flag; none of those have a
/// counterpart in [`bw_world::WorldMeta`], so they're read (to keep the
/// cursor aligned with the fields that follow) and discarded on import,
/// and written back out as fixed defaults on export.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldHeader {
    pub owner: String,
    pub title: String,
    pub width: u16,
    pub height: u16,
}

pub(crate) fn read_header(p: &mut Packet) -> CodecResult<WorldHeader> {
    let owner = p.read_str16()?;
    let title = p.read_str16()?;
    let width: i32 = p.read()?;
    let height: i32 = p.read()?;
    let _gravity: f32 = p.read()?;
    let _bgcolor: u32 = p.read()?;
    let _description = p.read_str16()?;
    let _campaign: u8 = p.read()?;
    let _crew_id = p.read_str16()?;
    let _crew_name = p.read_str16()?;
    let _crew_status: i32 = p.read()?;
    let _minimap: u8 = p.read()?;
    let _owner_id = p.read_str16()?;
    Ok(WorldHeader {
        owner,
        title,
        width: width.max(0) as u16,
        height: height.max(0) as u16,
    })
}

pub(crate) fn write_header(p: &mut Packet, header: &WorldHeader) -> CodecResult<()> {
    p.write_str16(&header.owner)?;
    p.write_str16(&header.title)?;
    p.write::<i32>(header.width as i32);
    p.write::<i32>(header.height as i32);
    p.write::<f32>(1.0);
    p.write::<u32>(0);
    p.write_str16("")?;
    p.write::<u8>(0);
    p.write_str16("")?;
    p.write_str16("")?;
    p.write::<i32>(0);
    p.write::<u8>(1);
    p.write_str16("exported from bw-server")?;
    Ok(())
}

/// Reads a position array: a `u32` byte length followed by that many
/// bytes' worth of `u16` coordinates.
pub(crate) fn read_pos_array(p: &mut Packet) -> CodecResult<Vec<u16>> {
    let byte_len: u32 = p.read()?;
    let count = (byte_len / 2) as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(p.read()?);
    }
    Ok(out)
}

pub(crate) fn write_pos_array(p: &mut Packet, values: &[u16]) {
    p.write::<u32>((values.len() * 2) as u32);
    for v in values {
        p.write(*v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = WorldHeader {
            owner: "alice".into(),
            title: "My World".into(),
            width: 50,
            height: 30,
        };
        let mut p = Packet::new().big_endian();
        write_header(&mut p, &header).unwrap();
        let read_back = read_header(&mut p).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn pos_array_roundtrips() {
        let values = vec![1u16, 2, 300, 65535];
        let mut p = Packet::new().big_endian();
        write_pos_array(&mut p, &values);
        assert_eq!(read_pos_array(&mut p).unwrap(), values);
    }
}
