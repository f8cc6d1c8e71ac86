//! Structure discovery: `RegistryInfo_GetInfo(SIZE/STRUCTURE/DEFAULT_VALUE)` walked in order
//! to build a [`crate::RegisterFile`] (`spec.md` §4.4 `initial_structure_reading`).

use xc2_protocol::consts::XC2RegGetInfoSubcommands;

use crate::error::RegisterError;
use crate::info::RegisterInfo;
use crate::transport::RegCommand;
use crate::RegisterFile;

pub async fn read_full_regs_structure(cmd: &dyn RegCommand, max_pkt_data_size: usize) -> Result<RegisterFile, RegisterError> {
    let size_reply = cmd.registry_get_info(XC2RegGetInfoSubcommands::SIZE, &[]).await?;
    let count = read_u16(&size_reply, 0)?;

    let mut regs = Vec::with_capacity(count as usize);
    let mut adr = 0usize;
    for idx in 0..count {
        let structure = cmd.registry_get_info(XC2RegGetInfoSubcommands::STRUCTURE, &idx.to_be_bytes()).await?;
        let flags = read_u16(&structure, 0)?;
        let array_size = read_u16(&structure, 2)?;
        let name_len = *structure
            .get(4)
            .ok_or_else(|| RegisterError::MalformedStructure(format!("register {idx} structure reply too short")))?
            as usize;
        let name_bytes = structure
            .get(5..5 + name_len)
            .ok_or_else(|| RegisterError::MalformedStructure(format!("register {idx} name truncated")))?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| RegisterError::MalformedStructure(format!("register {idx} name is not valid UTF-8")))?;

        let mut info = RegisterInfo::from_wire(idx, name, flags, array_size, adr)?;
        adr += info.byte_len();

        let mut default_bytes = cmd.registry_get_info(XC2RegGetInfoSubcommands::DEFAULT_VALUE, &idx.to_be_bytes()).await?;
        let expected_len = info.byte_len();
        let elem_width = info.element_width().max(1);
        // Short reply: the device didn't fit the whole default array in one GetInfo reply.
        // Fetch the missing tail elements one at a time (`spec.md` §4.3 step 6).
        while default_bytes.len() < expected_len {
            let element_idx = (default_bytes.len() / elem_width) as u16;
            let mut payload = idx.to_be_bytes().to_vec();
            payload.extend(element_idx.to_be_bytes());
            let tail = cmd.registry_get_info(XC2RegGetInfoSubcommands::DEFAULT_VALUE, &payload).await?;
            if tail.is_empty() {
                break;
            }
            default_bytes.extend_from_slice(&tail);
        }
        info.default = info.decode(&default_bytes);

        regs.push(info);
    }

    Ok(RegisterFile::new(regs, max_pkt_data_size))
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, RegisterError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| RegisterError::MalformedStructure("truncated u16 field".into()))
}
